//! Analytics events
//!
//! Available only when a measurement ID is configured. Events are emitted as
//! structured `tracing` records under the `analytics` target, so any
//! subscriber (or a log shipper behind it) can forward them.

use crate::config::FirebaseConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Longest event name Analytics accepts
pub const MAX_EVENT_NAME_LEN: usize = 40;

/// Analytics client
#[derive(Clone)]
pub struct Analytics {
    inner: Arc<AnalyticsInner>,
}

struct AnalyticsInner {
    measurement_id: String,
    counts: Mutex<HashMap<String, u64>>,
}

impl Analytics {
    /// Create a client, or `None` when no measurement ID is configured
    pub fn new(config: &FirebaseConfig) -> Option<Self> {
        let measurement_id = config
            .measurement_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())?;

        Some(Self {
            inner: Arc::new(AnalyticsInner {
                measurement_id: measurement_id.to_string(),
                counts: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Configured measurement ID
    pub fn measurement_id(&self) -> &str {
        &self.inner.measurement_id
    }

    /// Record an event; returns false if the name is rejected
    pub fn log_event(&self, name: &str, params: &[(&str, Value)]) -> bool {
        if !is_valid_event_name(name) {
            tracing::warn!(target: "analytics", name, "dropping event with invalid name");
            return false;
        }

        let params = Value::Object(
            params
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        );
        tracing::info!(
            target: "analytics",
            measurement_id = %self.inner.measurement_id,
            event = name,
            params = %params,
            "event"
        );

        *self.counts().entry(name.to_string()).or_insert(0) += 1;
        true
    }

    /// Number of times `name` was logged
    pub fn event_count(&self, name: &str) -> u64 {
        self.counts().get(name).copied().unwrap_or(0)
    }

    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        match self.inner.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("measurement_id", &self.inner.measurement_id)
            .finish()
    }
}

/// Letters, digits and underscores, starting with a letter
fn is_valid_event_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_EVENT_NAME_LEN
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(measurement_id: Option<&str>) -> FirebaseConfig {
        FirebaseConfig {
            measurement_id: measurement_id.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_requires_measurement_id() {
        assert!(Analytics::new(&config(None)).is_none());
        assert!(Analytics::new(&config(Some("  "))).is_none());
        assert_eq!(
            Analytics::new(&config(Some("G-ABC123"))).unwrap().measurement_id(),
            "G-ABC123"
        );
    }

    #[test]
    fn test_counts_events() {
        let analytics = Analytics::new(&config(Some("G-ABC123"))).unwrap();
        assert!(analytics.log_event("view_item", &[("item_id", json!("p1"))]));
        assert!(analytics.log_event("view_item", &[]));
        assert!(!analytics.log_event("1st-event", &[]));
        assert_eq!(analytics.event_count("view_item"), 2);
        assert_eq!(analytics.event_count("1st-event"), 0);
    }

    #[test]
    fn test_event_names() {
        assert!(is_valid_event_name("sign_up"));
        assert!(!is_valid_event_name(""));
        assert!(!is_valid_event_name("has space"));
        assert!(!is_valid_event_name(&"a".repeat(41)));
    }
}
