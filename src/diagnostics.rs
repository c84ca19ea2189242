//! Connectivity diagnostics
//!
//! One pass over configuration, initialization and each service, ending
//! with a real Firestore read and a Realtime Database probe write.

use crate::app::FirebaseApp;
use crate::connection::ConnectionMonitor;
use crate::firestore::{collections, Query};
use std::fmt;
use std::time::Duration;

/// How long a single live check may take
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Works
    Pass,
    /// Works in a degraded way, or an optional piece is missing
    Warn,
    /// Broken
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        })
    }
}

/// One named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// What was checked
    pub name: &'static str,
    /// Outcome
    pub status: CheckStatus,
    /// Details
    pub message: String,
}

/// All checks, in the order they ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticReport {
    /// Checks
    pub checks: Vec<Check>,
}

impl DiagnosticReport {
    fn push(&mut self, name: &'static str, status: CheckStatus, message: impl Into<String>) {
        let message = message.into();
        match status {
            CheckStatus::Pass => tracing::info!(check = name, "{}", message),
            CheckStatus::Warn => tracing::warn!(check = name, "{}", message),
            CheckStatus::Fail => tracing::error!(check = name, "{}", message),
        }
        self.checks.push(Check { name, status, message });
    }

    /// True if any check failed
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Fail)
    }

    /// Status of the check called `name`
    pub fn status_of(&self, name: &str) -> Option<CheckStatus> {
        self.checks.iter().find(|c| c.name == name).map(|c| c.status)
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "[{}] {:<12} {}", check.status, check.name, check.message)?;
        }
        Ok(())
    }
}

/// Run every check against `app`, initializing it if needed
pub async fn run_diagnostics(app: &FirebaseApp) -> DiagnosticReport {
    let mut report = DiagnosticReport::default();
    let config = app.config();

    let missing = config.missing_keys();
    if missing.is_empty() {
        report.push(
            "config",
            CheckStatus::Pass,
            format!("project {} ({:?})", config.project_id, config.environment),
        );
    } else {
        report.push("config", CheckStatus::Fail, format!("missing: {}", missing.join(", ")));
    }
    if config.emulators.is_some() {
        report.push("emulators", CheckStatus::Warn, "requests go to local emulators");
    }

    let services = match app.wait_for_init().await {
        Ok(services) => {
            report.push("initialize", CheckStatus::Pass, "services started");
            services
        }
        Err(e) => {
            report.push("initialize", CheckStatus::Fail, e.to_string());
            return report;
        }
    };

    for (name, present) in [
        ("auth", services.auth.is_some()),
        ("firestore", services.firestore.is_some()),
        ("storage", services.storage.is_some()),
        ("database", services.realtime.is_some()),
    ] {
        if present {
            report.push(name, CheckStatus::Pass, "available");
        } else {
            report.push(name, CheckStatus::Fail, "did not start");
        }
    }
    match &services.analytics {
        Some(analytics) => report.push(
            "analytics",
            CheckStatus::Pass,
            format!("measurement ID {}", analytics.measurement_id()),
        ),
        None => report.push("analytics", CheckStatus::Warn, "no measurement ID configured"),
    }

    if let Some(store) = &services.firestore {
        let query = Query::new(collections::PROPERTIES).limit(1);
        match tokio::time::timeout(CHECK_TIMEOUT, store.query(&query)).await {
            Ok(Ok(docs)) => report.push(
                "firestore-read",
                CheckStatus::Pass,
                format!("read {} document(s) from {}", docs.len(), collections::PROPERTIES),
            ),
            Ok(Err(e)) => report.push(
                "firestore-read",
                CheckStatus::Fail,
                format!("{}: {}", e.code(), e),
            ),
            Err(_) => report.push("firestore-read", CheckStatus::Fail, "timed out"),
        }
    }

    if let Some(database) = &services.realtime {
        let monitor = ConnectionMonitor::new(database.clone());
        match tokio::time::timeout(CHECK_TIMEOUT, monitor.reconnect()).await {
            Ok(true) => report.push("database-probe", CheckStatus::Pass, "probe write succeeded"),
            Ok(false) => report.push("database-probe", CheckStatus::Fail, "probe write failed"),
            Err(_) => report.push("database-probe", CheckStatus::Fail, "timed out"),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ServiceFactory;
    use crate::auth::{AuthBackend, MemoryAuth};
    use crate::config::FirebaseConfig;
    use crate::error::{FirebaseError, FirestoreError};
    use crate::firestore::{DocumentStore, MemoryStore};
    use crate::realtime::{MemoryRealtimeDb, RealtimeDatabase};
    use crate::storage::ObjectStorage;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Fakes {
        store: MemoryStore,
        database: MemoryRealtimeDb,
    }

    #[async_trait]
    impl ServiceFactory for Fakes {
        async fn create_app(&self, _: &FirebaseConfig) -> Result<(), FirebaseError> {
            Ok(())
        }
        async fn auth(&self, _: &FirebaseConfig) -> Result<Arc<dyn AuthBackend>, FirebaseError> {
            Ok(Arc::new(MemoryAuth::new()))
        }
        async fn firestore(&self, _: &FirebaseConfig) -> Result<Arc<dyn DocumentStore>, FirebaseError> {
            Ok(Arc::new(self.store.clone()))
        }
        async fn storage(&self, _: &FirebaseConfig) -> Result<Arc<dyn ObjectStorage>, FirebaseError> {
            Err(FirebaseError::Config("Storage bucket is not configured".into()))
        }
        async fn realtime(&self, _: &FirebaseConfig) -> Result<Arc<dyn RealtimeDatabase>, FirebaseError> {
            Ok(Arc::new(self.database.clone()))
        }
    }

    fn config() -> FirebaseConfig {
        FirebaseConfig {
            api_key: "AIzaTestKey".into(),
            project_id: "reality-test".into(),
            app_id: "1:123:web:abc".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_report_flags_missing_service_and_failed_read() {
        let fakes = Fakes {
            store: MemoryStore::new(),
            database: MemoryRealtimeDb::new(true),
        };
        fakes.store.fail_next(1, FirestoreError::PermissionDenied("rules".into())).await;
        let app = FirebaseApp::new(config(), Arc::new(fakes));

        let report = run_diagnostics(&app).await;
        assert_eq!(report.status_of("config"), Some(CheckStatus::Pass));
        assert_eq!(report.status_of("storage"), Some(CheckStatus::Fail));
        assert_eq!(report.status_of("analytics"), Some(CheckStatus::Warn));
        assert_eq!(report.status_of("firestore-read"), Some(CheckStatus::Fail));
        assert_eq!(report.status_of("database-probe"), Some(CheckStatus::Pass));
        assert!(report.has_failures());
        assert!(report.to_string().contains("[FAIL] storage"));
    }

    #[tokio::test]
    async fn test_unconfigured_app_stops_after_initialize() {
        let fakes = Fakes {
            store: MemoryStore::new(),
            database: MemoryRealtimeDb::new(false),
        };
        let app = FirebaseApp::new(FirebaseConfig::default(), Arc::new(fakes));
        let report = run_diagnostics(&app).await;
        assert_eq!(report.status_of("config"), Some(CheckStatus::Fail));
        assert_eq!(report.status_of("initialize"), Some(CheckStatus::Fail));
        assert_eq!(report.checks.len(), 2);
    }
}
