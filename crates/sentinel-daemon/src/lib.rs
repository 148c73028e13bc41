//! sentinel-daemon library target.
//!
//! Exposes the router, scheduler, and shared state so integration tests can
//! compose them directly. The binary in `main.rs` depends on this library.

pub mod api_types;
pub mod ring;
pub mod routes;
pub mod scheduler;
pub mod state;
