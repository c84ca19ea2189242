//! Estate Firebase
//!
//! Firebase access layer for a real-estate listing site: a lazily
//! initialized app handle, Firestore access with retry and backoff, an auth
//! session that mirrors sign-in state into a cookie, and a Realtime Database
//! connection monitor.
//!
//! # Example (listings with fallback)
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use estate_firebase::{FirebaseApp, FirebaseConfig};
//!
//! let app = FirebaseApp::with_default_services(FirebaseConfig::from_dotenv());
//! let listings = app.properties().await?.get_all_properties().await;
//! println!("{} listings", listings.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analytics;
pub mod app;
pub mod config;
pub mod connection;
pub mod dashboard;
pub mod diagnostics;
pub mod error;
pub mod firestore;
pub mod models;
pub mod realtime;
pub mod repository;
pub mod retry;
pub mod storage;

// Auth module
pub mod auth {
    //! Firebase Authentication

    pub mod auth;
    pub mod memory;
    pub mod session;
    pub mod types;

    pub use auth::{AuthBackend, AuthStateStream, RestAuth};
    pub use memory::MemoryAuth;
    pub use session::{
        AuthCookie, AuthSession, AuthState, CookieStore, MemoryCookieStore, SessionState,
        AUTH_COOKIE,
    };
    pub use types::{ProfileChanges, User};
}

// Re-exports for convenience
pub use app::{DefaultServiceFactory, FirebaseApp, InitState, ServiceFactory, Services};
pub use config::{Environment, FirebaseConfig};
pub use error::{AuthError, FirebaseError, FirestoreError, InitError, StorageError};

// Auth re-exports
pub use auth::{AuthBackend, AuthSession, User};

// Data re-exports
pub use connection::{ConnectionMonitor, ConnectionStatus};
pub use diagnostics::{run_diagnostics, DiagnosticReport};
pub use firestore::{DocumentStore, Query, RetryingStore};
pub use repository::{FavoriteRepository, MessageRepository, PropertyRepository, UserRepository};
pub use retry::{RetryMode, RetryPolicy};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_types_exist() {
        let _err: FirebaseError = AuthError::InvalidEmail.into();
    }
}
