//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a registered worker-callback wait may stay outstanding.
    pub worker_wait_timeout_secs: u64,
    /// Capacity of the dispatch channel handing task instances to workers.
    pub dispatch_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_wait_timeout_secs: 3600,
            dispatch_buffer: 1024,
        }
    }
}

impl EngineConfig {
    pub fn worker_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.worker_wait_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"dispatch_buffer": 8}"#).unwrap();
        assert_eq!(config.dispatch_buffer, 8);
        assert_eq!(config.worker_wait_timeout(), Duration::from_secs(3600));
    }
}
