//! `vigil-store`: SQLite persistence for check history, markers and the
//! live scheduler config.
//!
//! Every store owns its own `Connection` to the same database file, so the
//! cycle controller, the local-job engine and HTTP handlers never contend on
//! one connection.

pub mod db;
pub mod error;
pub mod history;
pub mod settings;

pub use error::{Result, StoreError};
pub use history::{HistoryStore, Marker, CANCELLED_AT, LAST_INTERVAL_RESET};
pub use settings::SettingsStore;
