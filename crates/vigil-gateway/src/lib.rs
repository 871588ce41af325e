//! `vigil-gateway`: HTTP surface and process wiring for the check cycle.

pub mod app;
pub mod http;
pub mod probe;
pub mod watchdog;

pub use app::{build_router, spawn_autostart, AppState, Gateway};
