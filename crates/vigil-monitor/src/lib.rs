//! `vigil-monitor`: read-only views over check history.
//!
//! Nothing here feeds back into scheduling. The reconciler decides which
//! trigger source is authoritative, the classifier grades how overdue a source
//! is, and the drift analyzer scores how closely observed intervals track the
//! expected one.

pub mod drift;
pub mod health;
pub mod reconciler;
pub mod report;

pub use drift::{stats, IntervalStats};
pub use health::{classify, Escalation, Health, RetryEscalation};
pub use reconciler::{last_event_for, ActiveSource, ReconcileInput, SourceReconciler, SourceStrategy};
pub use report::{MonitorReport, SourceStatus};
