use vigil_core::SchedulerConfig;
use vigil_store::SettingsStore;

use crate::error::{CycleError, Result};

/// Where the controller reads the live scheduler config from.
///
/// Implementations must not cache: the controller calls this after every
/// check so an operator's change lands within one cycle.
pub trait ConfigSource: Send + Sync {
    fn scheduler_config(&self) -> Result<SchedulerConfig>;
}

impl ConfigSource for SettingsStore {
    fn scheduler_config(&self) -> Result<SchedulerConfig> {
        SettingsStore::scheduler_config(self).map_err(|e| CycleError::Config(e.to_string()))
    }
}
