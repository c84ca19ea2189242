//! Firebase configuration
//!
//! Reads the `NEXT_PUBLIC_FIREBASE_*` environment variables shared with the
//! web front end into a typed [`FirebaseConfig`], and decides whether the
//! project is actually configured or still carries template placeholders.

use std::fmt;

/// Environment variable names
pub mod keys {
    /// Web API key
    pub const API_KEY: &str = "NEXT_PUBLIC_FIREBASE_API_KEY";
    /// Auth domain (`<project>.firebaseapp.com`)
    pub const AUTH_DOMAIN: &str = "NEXT_PUBLIC_FIREBASE_AUTH_DOMAIN";
    /// Google Cloud project ID
    pub const PROJECT_ID: &str = "NEXT_PUBLIC_FIREBASE_PROJECT_ID";
    /// Storage bucket (`<project>.appspot.com`)
    pub const STORAGE_BUCKET: &str = "NEXT_PUBLIC_FIREBASE_STORAGE_BUCKET";
    /// Cloud Messaging sender ID
    pub const MESSAGING_SENDER_ID: &str = "NEXT_PUBLIC_FIREBASE_MESSAGING_SENDER_ID";
    /// Firebase app ID
    pub const APP_ID: &str = "NEXT_PUBLIC_FIREBASE_APP_ID";
    /// Analytics measurement ID
    pub const MEASUREMENT_ID: &str = "NEXT_PUBLIC_FIREBASE_MEASUREMENT_ID";
    /// Realtime Database URL
    pub const DATABASE_URL: &str = "NEXT_PUBLIC_FIREBASE_DATABASE_URL";
    /// `true` to talk to the local emulator suite
    pub const USE_EMULATORS: &str = "NEXT_PUBLIC_USE_FIREBASE_EMULATORS";
    /// Node-style environment name
    pub const NODE_ENV: &str = "NODE_ENV";
    /// Vercel deployment environment
    pub const VERCEL_ENV: &str = "VERCEL_ENV";
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Vercel preview deployment
    Preview,
    /// Production deployment
    Production,
    /// Test runs
    Test,
}

impl Environment {
    /// Derive from `VERCEL_ENV` (preferred) and `NODE_ENV`
    pub fn detect(vercel_env: Option<&str>, node_env: Option<&str>) -> Self {
        match vercel_env.map(str::trim) {
            Some("production") => return Self::Production,
            Some("preview") => return Self::Preview,
            Some("development") => return Self::Development,
            _ => {}
        }
        match node_env.map(str::trim) {
            Some("production") => Self::Production,
            Some("test") => Self::Test,
            _ => Self::Development,
        }
    }

    /// True for production deployments
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Local emulator suite endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorSettings {
    /// Host all emulators listen on
    pub host: String,
    /// Auth emulator port
    pub auth_port: u16,
    /// Firestore emulator port
    pub firestore_port: u16,
    /// Storage emulator port
    pub storage_port: u16,
    /// Realtime Database emulator port
    pub database_port: u16,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            auth_port: 9099,
            firestore_port: 8080,
            storage_port: 9199,
            database_port: 9000,
        }
    }
}

impl EmulatorSettings {
    /// Base URL of the auth emulator
    pub fn auth_url(&self) -> String {
        format!("http://{}:{}", self.host, self.auth_port)
    }

    /// Base URL of the Firestore emulator
    pub fn firestore_url(&self) -> String {
        format!("http://{}:{}", self.host, self.firestore_port)
    }

    /// Base URL of the Storage emulator
    pub fn storage_url(&self) -> String {
        format!("http://{}:{}", self.host, self.storage_port)
    }

    /// Base URL of the Realtime Database emulator
    pub fn database_url(&self) -> String {
        format!("http://{}:{}", self.host, self.database_port)
    }
}

/// Typed Firebase project configuration
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: String,
    /// Auth domain
    pub auth_domain: String,
    /// Project ID
    pub project_id: String,
    /// Storage bucket
    pub storage_bucket: String,
    /// Messaging sender ID
    pub messaging_sender_id: String,
    /// App ID
    pub app_id: String,
    /// Analytics measurement ID
    pub measurement_id: Option<String>,
    /// Realtime Database URL
    pub database_url: Option<String>,
    /// Emulator endpoints, when emulators are enabled
    pub emulators: Option<EmulatorSettings>,
    /// Deployment environment
    pub environment: Environment,
}

impl FirebaseConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load `.env` (if present) into the process environment, then read it
    pub fn from_dotenv() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) => tracing::debug!("no .env loaded: {}", e),
        }
        Self::from_env()
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = Environment::detect(
            get(keys::VERCEL_ENV).as_deref(),
            get(keys::NODE_ENV).as_deref(),
        );

        let wants_emulators = get(keys::USE_EMULATORS)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let emulators = if wants_emulators && !environment.is_production() {
            Some(EmulatorSettings::default())
        } else {
            if wants_emulators {
                tracing::warn!("ignoring {} in production", keys::USE_EMULATORS);
            }
            None
        };

        Self {
            api_key: get(keys::API_KEY).unwrap_or_default(),
            auth_domain: get(keys::AUTH_DOMAIN).unwrap_or_default(),
            project_id: get(keys::PROJECT_ID).unwrap_or_default(),
            storage_bucket: get(keys::STORAGE_BUCKET).unwrap_or_default(),
            messaging_sender_id: get(keys::MESSAGING_SENDER_ID).unwrap_or_default(),
            app_id: get(keys::APP_ID).unwrap_or_default(),
            measurement_id: get(keys::MEASUREMENT_ID),
            database_url: get(keys::DATABASE_URL),
            emulators,
            environment,
        }
    }

    /// True when the required keys are present and not template placeholders
    pub fn is_configured(&self) -> bool {
        self.missing_keys().is_empty()
    }

    /// Names of required keys that are missing or placeholders
    pub fn missing_keys(&self) -> Vec<&'static str> {
        [
            (keys::API_KEY, &self.api_key),
            (keys::PROJECT_ID, &self.project_id),
            (keys::APP_ID, &self.app_id),
        ]
        .into_iter()
        .filter(|(_, value)| is_placeholder(value))
        .map(|(key, _)| key)
        .collect()
    }

    /// Realtime Database URL, defaulting to the project's default instance
    pub fn realtime_database_url(&self) -> Option<String> {
        if let Some(url) = &self.database_url {
            return Some(url.trim_end_matches('/').to_string());
        }
        if self.project_id.is_empty() {
            return None;
        }
        Some(format!(
            "https://{}-default-rtdb.firebaseio.com",
            self.project_id
        ))
    }

    /// API key with everything but the last four characters masked
    pub fn masked_api_key(&self) -> String {
        mask(&self.api_key)
    }
}

impl fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &self.masked_api_key())
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .field("measurement_id", &self.measurement_id)
            .field("database_url", &self.database_url)
            .field("emulators", &self.emulators)
            .field("environment", &self.environment)
            .finish()
    }
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with("your")
        || lower.starts_with("xxx")
        || lower.contains("placeholder")
        || lower == "undefined"
        || lower == "null"
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn configured() -> Vec<(&'static str, &'static str)> {
        vec![
            (keys::API_KEY, "AIzaSyExampleKey1234"),
            (keys::PROJECT_ID, "reality-sk"),
            (keys::APP_ID, "1:123:web:abc"),
            (keys::STORAGE_BUCKET, "reality-sk.appspot.com"),
        ]
    }

    #[test]
    fn test_configured_project() {
        let config = FirebaseConfig::from_lookup(lookup(&configured()));
        assert!(config.is_configured());
        assert_eq!(config.project_id, "reality-sk");
        assert_eq!(
            config.realtime_database_url().as_deref(),
            Some("https://reality-sk-default-rtdb.firebaseio.com")
        );
    }

    #[test]
    fn test_placeholders_are_not_configured() {
        let config = FirebaseConfig::from_lookup(lookup(&[
            (keys::API_KEY, "your-api-key"),
            (keys::PROJECT_ID, "reality-sk"),
            (keys::APP_ID, ""),
        ]));
        assert!(!config.is_configured());
        assert_eq!(config.missing_keys(), vec![keys::API_KEY, keys::APP_ID]);
    }

    #[test]
    fn test_environment_detection() {
        assert_eq!(Environment::detect(Some("preview"), Some("production")), Environment::Preview);
        assert_eq!(Environment::detect(None, Some("production")), Environment::Production);
        assert_eq!(Environment::detect(None, Some("test")), Environment::Test);
        assert_eq!(Environment::detect(None, None), Environment::Development);
    }

    #[test]
    fn test_emulators_ignored_in_production() {
        let mut pairs = configured();
        pairs.push((keys::USE_EMULATORS, "true"));
        let dev = FirebaseConfig::from_lookup(lookup(&pairs));
        assert_eq!(dev.emulators, Some(EmulatorSettings::default()));

        pairs.push((keys::NODE_ENV, "production"));
        let prod = FirebaseConfig::from_lookup(lookup(&pairs));
        assert!(prod.emulators.is_none());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = FirebaseConfig::from_lookup(lookup(&configured()));
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AIzaSyExampleKey1234"));
        assert!(debug.contains("1234"));
    }
}
