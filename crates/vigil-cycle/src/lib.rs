//! `vigil-cycle`: the self-perpetuating check cycle.
//!
//! # Lifecycle
//!
//! ```text
//! start ─▶ running ─┬─▶ scheduled-continuation   (interval from fresh config)
//!                   ├─▶ cancelled                (cancellation marker newer than lineage)
//!                   ├─▶ recovery-scheduled       (check/config/store failure, 15 s)
//!                   └─▶ backup-scheduled         (continuation dispatch failed, 15 s)
//! ```
//!
//! No invocation blocks past its single sleep. Each one hands a
//! [`vigil_core::CycleLineage`] to a [`dispatch::Dispatcher`] and returns; the
//! chain lives only in those hand-offs and in the history they leave behind.

pub mod cancel;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod executor;

pub use cancel::CancellationSignal;
pub use config::ConfigSource;
pub use controller::{CycleController, CycleOutcome, CycleSettings, CycleStatus, InFlight};
pub use dispatch::{lineage_query, Dispatcher, HttpDispatcher, LocalDispatcher};
pub use error::{CycleError, Result};
pub use executor::{CheckExecutor, CheckOutcome, HttpCheckExecutor};
