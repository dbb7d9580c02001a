//! HTTP service for template-driven PDF rendering.
//!
//! The binary in `main.rs` wires configuration, the database, the render
//! pipeline and background jobs; everything it needs lives here so the
//! integration tests can build the same router.

pub mod auth;
pub mod background;
pub mod cases;
pub mod config;
pub mod error;
pub mod router;
pub mod routes;
pub mod state;
