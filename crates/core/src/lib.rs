//! Domain core of the document service: injectable values and their
//! resolution, scope activation, template versions and PDF rendering.
//!
//! This crate has no database or HTTP dependencies; persistence is reached
//! through the store traits (`ScopeStore`, `VersionStore`) implemented in
//! `docforge-db`.

pub mod auth;
pub mod content;
pub mod document;
pub mod error;
pub mod hashing;
pub mod injectable;
pub mod naming;
pub mod provider;
pub mod render;
pub mod resolution;
pub mod scope;
pub mod types;
pub mod version;
