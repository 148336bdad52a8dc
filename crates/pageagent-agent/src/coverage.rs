//! Coverage payload flushed to the controller on unload

use dashmap::DashMap;
use serde_json::Value;

/// Something that may hold a coverage payload at unload time.
pub trait CoverageSource: Send + Sync {
    /// The payload to submit, or `None` when there is nothing to flush.
    fn snapshot(&self) -> Option<Value>;
}

impl<F> CoverageSource for F
where
    F: Fn() -> Option<Value> + Send + Sync,
{
    fn snapshot(&self) -> Option<Value> {
        self()
    }
}

/// Hit counters keyed by location, submitted as a JSON object.
#[derive(Default)]
pub struct CoverageCounters {
    hits: DashMap<String, u64>,
}

impl CoverageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self, location: &str) {
        *self.hits.entry(location.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, location: &str) -> u64 {
        self.hits.get(location).map(|c| *c).unwrap_or(0)
    }
}

impl CoverageSource for CoverageCounters {
    fn snapshot(&self) -> Option<Value> {
        if self.hits.is_empty() {
            return None;
        }
        let map: serde_json::Map<String, Value> = self
            .hits
            .iter()
            .map(|e| (e.key().clone(), Value::from(*e.value())))
            .collect();
        Some(Value::Object(map))
    }
}
