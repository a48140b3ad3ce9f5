//! Error types for TableHop

use thiserror::Error;

/// Result type alias for TableHop operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in TableHop
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Callback listener unavailable: {0}")]
    ListenerUnavailable(String),

    #[error("Cannot present consent UI: {0}")]
    ConsentUi(String),

    #[error("Timed out waiting for the browser consent redirect")]
    ConsentTimeout,

    #[error("Login cancelled")]
    Cancelled,

    #[error("A Google login is already in progress")]
    LoginInProgress,

    #[error("Code exchange failed: {0}")]
    CodeExchange(String),

    #[error("Identity exchange failed: {0}")]
    IdentityExchange(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Profile missing after existing-user login: {0}")]
    ProfileMissing(String),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
