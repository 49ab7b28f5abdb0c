//! HTTP surface: liveness, outbound send, and the operator API.

pub mod admin_routes;
pub mod server;

pub use server::{AppState, build_app, serve};
