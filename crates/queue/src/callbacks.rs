//! Monitoring callbacks registered per trigger run.
//!
//! Whoever watches a run (log tailers, webhook notifiers) registers a
//! callback under the trigger id.  The `end` volume task releases them.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::info;

#[derive(Debug, Default)]
pub struct MonitoringCallbacks {
    by_trigger: Mutex<HashMap<String, Vec<String>>>,
}

impl MonitoringCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trigger_id: impl Into<String>, callback: impl Into<String>) {
        self.lock().entry(trigger_id.into()).or_default().push(callback.into());
    }

    /// Drop every callback of `trigger_id`, returning how many were released.
    pub fn clear_by_trigger_id(&self, trigger_id: &str) -> usize {
        let released = self.lock().remove(trigger_id).map_or(0, |v| v.len());
        info!(%trigger_id, released, "released monitoring callbacks");
        released
    }

    pub fn registered(&self, trigger_id: &str) -> usize {
        self.lock().get(trigger_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.by_trigger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
