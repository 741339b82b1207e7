//! `waypoint-http` — serves a `waypoint-core` registry over HTTP.
//!
//! The adapter walks a registry's route table into concrete axum routes
//! (one per URL form per declared version), wires the middleware chain and
//! exception tables into per-route dispatch stubs, and installs the
//! documentation-producing 404 as the fallback.

pub mod adapter;
mod dispatch;
pub mod not_found;
pub mod server;

pub use adapter::build_router;
pub use not_found::{NOT_FOUND_MESSAGE, documentation_404, json_error};
pub use server::{ServerConfig, serve};
