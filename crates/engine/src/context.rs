//! Per-call request context, passed explicitly into every orchestrator and
//! trigger operation and recorded on their spans.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub correlation_id: String,
}

impl CallContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }

    /// A context with a fresh random correlation id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().simple().to_string())
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::generate()
    }
}
