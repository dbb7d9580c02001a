//! Long-running maintenance tasks spawned by `main`.
//!
//! Each task runs until its `CancellationToken` is cancelled.

pub mod image_cache_cleanup;
pub mod version_scheduler;
