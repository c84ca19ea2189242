//! Error types
//!
//! Provides a unified error type hierarchy for every Firebase-backed operation
//! in the crate.
//!
//! # Design
//! Uses thiserror for ergonomic error definitions. Module errors (Auth,
//! Firestore, Storage, initialization) convert into [`FirebaseError`] via
//! `From`. Every Firebase error carries the Firebase code string it maps to
//! (`auth/user-not-found`, `permission-denied`, `storage/unauthorized`), which
//! is what the retry allowlist and the user-facing message table key on.

use thiserror::Error;

/// Top-level error type
///
/// # Example
/// ```
/// use estate_firebase::{FirebaseError, AuthError};
///
/// let err: FirebaseError = AuthError::InvalidEmail.into();
/// assert_eq!(err.code(), "auth/invalid-email");
/// ```
#[derive(Debug, Error)]
pub enum FirebaseError {
    /// Authentication-related errors
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Firestore-related errors
    #[error("Firestore error: {0}")]
    Firestore(#[from] FirestoreError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Initialization guard errors
    #[error("Initialization error: {0}")]
    Init(#[from] InitError),

    /// Realtime Database rejected a request or is unreachable
    #[error("Realtime Database error: {0}")]
    Database(String),

    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Form input rejected before reaching the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication errors
///
/// Maps Firebase Auth error codes (both the REST `EMAIL_NOT_FOUND` style and
/// the web SDK `auth/user-not-found` style) to enum variants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email address is invalid
    #[error("Invalid email address")]
    InvalidEmail,

    /// Password is invalid or too weak
    #[error("Invalid password")]
    InvalidPassword,

    /// Email already in use by another account
    #[error("Email already in use")]
    EmailAlreadyInUse,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Wrong password
    #[error("Wrong password")]
    WrongPassword,

    /// Email/password pair rejected without saying which part was wrong
    #[error("Invalid login credentials")]
    InvalidLoginCredentials,

    /// User account has been disabled
    #[error("User account disabled")]
    UserDisabled,

    /// Too many failed login attempts
    #[error("Too many requests, try again later")]
    TooManyRequests,

    /// Operation not allowed (e.g., provider disabled)
    #[error("Operation not allowed")]
    OperationNotAllowed,

    /// User token has expired
    #[error("User token expired")]
    UserTokenExpired,

    /// Invalid user token
    #[error("Invalid user token")]
    InvalidUserToken,

    /// Network error
    #[error("Network error: {0}")]
    NetworkRequestFailed(String),

    /// No signed-in user
    #[error("No user is currently signed in")]
    NoSignedInUser,

    /// Requires recent login
    #[error("This operation requires recent authentication")]
    RequiresRecentLogin,

    /// Invalid API key
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Unknown error with the raw code
    #[error("Unknown auth error: {0}")]
    Unknown(String),
}

/// Firestore errors
///
/// One variant per Firestore status code. Variants that carry a `String`
/// hold the document path or the server message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FirestoreError {
    /// Document not found
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Resource exhausted (e.g., quota exceeded)
    #[error("Resource exhausted")]
    ResourceExhausted,

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored data could not be decoded into the expected shape
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Deadline exceeded
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Operation was aborted
    #[error("Operation aborted")]
    Aborted,

    /// Precondition failed (e.g., missing index)
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Unauthenticated
    #[error("Unauthenticated")]
    Unauthenticated,

    /// Connection or network error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unknown error with the raw status
    #[error("Unknown Firestore error: {0}")]
    Unknown(String),
}

/// Storage errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Caller is not allowed to access the object
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Object does not exist
    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// Bucket quota exceeded
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// Invalid path or payload
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection or network error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Unknown error with the raw message
    #[error("Unknown storage error: {0}")]
    Unknown(String),
}

/// Initialization guard errors
///
/// Clone so the memoized initialization result can be handed to every caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitError {
    /// Required configuration keys are missing or placeholders
    #[error("Firebase is not configured: {0}")]
    NotConfigured(String),

    /// Initialization failed; terminal for this app instance
    #[error("Firebase initialization failed: {0}")]
    Failed(String),

    /// The app is initialized but this service did not start
    #[error("Firebase service '{0}' is not available")]
    ServiceUnavailable(&'static str),
}

impl FirebaseError {
    /// Create an internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Firebase-style code for this error
    pub fn code(&self) -> String {
        match self {
            Self::Auth(e) => e.code().to_string(),
            Self::Firestore(e) => e.code().to_string(),
            Self::Storage(e) => e.code().to_string(),
            Self::Init(_) => "app/initialization-failed".to_string(),
            Self::Database(_) => "database/unavailable".to_string(),
            Self::Network(_) => "network-request-failed".to_string(),
            Self::Serialization(_) => "invalid-data".to_string(),
            Self::Config(_) => "app/invalid-config".to_string(),
            Self::Validation(_) => "invalid-argument".to_string(),
            Self::Internal(_) => "internal".to_string(),
        }
    }

    /// Check if error is worth retrying
    ///
    /// This is the allowlist the retry wrapper consults: transient transport
    /// and server-side conditions only. Permission, not-found and validation
    /// failures are reported on the first attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_)
            | Self::Auth(AuthError::NetworkRequestFailed(_))
            | Self::Auth(AuthError::TooManyRequests)
            | Self::Storage(StorageError::Connection(_)) => true,
            Self::Firestore(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Check if error indicates authentication is required
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Auth(AuthError::NoSignedInUser)
                | Self::Auth(AuthError::RequiresRecentLogin)
                | Self::Auth(AuthError::UserTokenExpired)
                | Self::Auth(AuthError::InvalidUserToken)
                | Self::Firestore(FirestoreError::Unauthenticated)
        )
    }

    /// Message suitable for showing in a form or banner
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(e) => e.user_message().to_string(),
            Self::Firestore(FirestoreError::PermissionDenied(_)) => {
                "You do not have permission to perform this action".to_string()
            }
            Self::Firestore(FirestoreError::NotFound(_)) => {
                "The requested item was not found".to_string()
            }
            Self::Validation(msg) => msg.clone(),
            _ if self.is_retryable() => {
                "Connection problem, please try again later".to_string()
            }
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

impl AuthError {
    /// Create from a Firebase Auth error code
    ///
    /// Accepts REST codes (`EMAIL_NOT_FOUND`, `WEAK_PASSWORD : Password should
    /// be at least 6 characters`) and web SDK codes (`auth/user-not-found`).
    pub fn from_error_code(code: &str) -> Self {
        let code = code
            .split(|c: char| c == ' ' || c == ':')
            .next()
            .unwrap_or(code);
        match code {
            "EMAIL_NOT_FOUND" | "auth/user-not-found" => Self::UserNotFound,
            "INVALID_PASSWORD" | "auth/wrong-password" => Self::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" | "auth/invalid-credential" => {
                Self::InvalidLoginCredentials
            }
            "USER_DISABLED" | "auth/user-disabled" => Self::UserDisabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" | "auth/too-many-requests" => Self::TooManyRequests,
            "EMAIL_EXISTS" | "auth/email-already-in-use" => Self::EmailAlreadyInUse,
            "OPERATION_NOT_ALLOWED" | "auth/operation-not-allowed" => Self::OperationNotAllowed,
            "INVALID_EMAIL" | "MISSING_EMAIL" | "auth/invalid-email" => Self::InvalidEmail,
            "WEAK_PASSWORD" | "MISSING_PASSWORD" | "auth/weak-password" => Self::InvalidPassword,
            "INVALID_ID_TOKEN" | "auth/invalid-user-token" => Self::InvalidUserToken,
            "TOKEN_EXPIRED" | "auth/user-token-expired" => Self::UserTokenExpired,
            "INVALID_API_KEY" | "auth/invalid-api-key" => Self::InvalidApiKey,
            "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" | "auth/requires-recent-login" => {
                Self::RequiresRecentLogin
            }
            "auth/network-request-failed" => Self::NetworkRequestFailed(code.to_string()),
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Web SDK style code
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidEmail => "auth/invalid-email",
            Self::InvalidPassword => "auth/weak-password",
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::InvalidLoginCredentials => "auth/invalid-credential",
            Self::UserDisabled => "auth/user-disabled",
            Self::TooManyRequests => "auth/too-many-requests",
            Self::OperationNotAllowed => "auth/operation-not-allowed",
            Self::UserTokenExpired => "auth/user-token-expired",
            Self::InvalidUserToken => "auth/invalid-user-token",
            Self::NetworkRequestFailed(_) => "auth/network-request-failed",
            Self::NoSignedInUser => "auth/no-current-user",
            Self::RequiresRecentLogin => "auth/requires-recent-login",
            Self::InvalidApiKey => "auth/invalid-api-key",
            Self::Unknown(code) => code,
        }
    }

    /// User-facing message
    ///
    /// Unknown and wrong-credential codes collapse into the same text so the
    /// login form does not reveal which accounts exist.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound | Self::WrongPassword | Self::InvalidLoginCredentials => {
                "Email or password is incorrect"
            }
            Self::InvalidEmail => "Please enter a valid email address",
            Self::InvalidPassword => "Password must be at least 6 characters long",
            Self::EmailAlreadyInUse => "An account with this email already exists",
            Self::UserDisabled => "This account has been disabled",
            Self::TooManyRequests => "Too many attempts, please try again later",
            Self::NetworkRequestFailed(_) => "Network error, check your connection",
            Self::RequiresRecentLogin => "Please sign in again to continue",
            Self::NoSignedInUser | Self::UserTokenExpired | Self::InvalidUserToken => {
                "Your session has expired, please sign in again"
            }
            Self::OperationNotAllowed | Self::InvalidApiKey => {
                "Sign-in is currently unavailable"
            }
            Self::Unknown(_) => "Authentication failed, please try again",
        }
    }
}

impl FirestoreError {
    /// Create from a REST `status` string (`NOT_FOUND`, `UNAVAILABLE`, ...)
    pub fn from_status(status: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            "ABORTED" => Self::Aborted,
            "INVALID_ARGUMENT" => Self::InvalidArgument(message),
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "NOT_FOUND" => Self::NotFound(message),
            "ALREADY_EXISTS" => Self::AlreadyExists(message),
            "PERMISSION_DENIED" => Self::PermissionDenied(message),
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "FAILED_PRECONDITION" => Self::FailedPrecondition(message),
            "INTERNAL" => Self::Internal(message),
            "UNAVAILABLE" => Self::Unavailable(message),
            "UNAUTHENTICATED" => Self::Unauthenticated,
            _ => Self::Unknown(format!("{}: {}", status, message)),
        }
    }

    /// Create from an HTTP status when the body carries no `status` string
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::InvalidArgument(message),
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied(message),
            404 => Self::NotFound(message),
            409 => Self::Aborted,
            429 => Self::ResourceExhausted,
            500 => Self::Internal(message),
            503 => Self::Unavailable(message),
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Firestore code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not-found",
            Self::PermissionDenied(_) => "permission-denied",
            Self::AlreadyExists(_) => "already-exists",
            Self::ResourceExhausted => "resource-exhausted",
            Self::InvalidArgument(_) => "invalid-argument",
            Self::InvalidData(_) => "data-loss",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Aborted => "aborted",
            Self::FailedPrecondition(_) => "failed-precondition",
            Self::Internal(_) => "internal",
            Self::Unavailable(_) => "unavailable",
            Self::Unauthenticated => "unauthenticated",
            Self::Connection(_) => "unavailable",
            Self::Unknown(_) => "unknown",
        }
    }

    /// Transient conditions worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_)
                | Self::Connection(_)
                | Self::DeadlineExceeded
                | Self::ResourceExhausted
                | Self::Aborted
        )
    }
}

impl StorageError {
    /// Create from an HTTP status returned by the Storage REST API
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::ObjectNotFound(message),
            429 => Self::QuotaExceeded,
            400 => Self::InvalidArgument(message),
            _ => Self::Unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Storage code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "storage/unauthorized",
            Self::ObjectNotFound(_) => "storage/object-not-found",
            Self::QuotaExceeded => "storage/quota-exceeded",
            Self::InvalidArgument(_) => "storage/invalid-argument",
            Self::Connection(_) => "storage/retry-limit-exceeded",
            Self::Unknown(_) => "storage/unknown",
        }
    }
}
