use thiserror::Error;

/// Failures raised by the store. The socket layer maps these onto `error`
/// frames via [`StoreError::reason`]; a REST layer would map them onto
/// status codes the same way.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The referenced message or user does not exist.
    #[error("Record not found")]
    NotFound,

    /// The caller does not own the message they tried to mutate.
    #[error("Not the author of this message")]
    Unauthorized,

    /// More than 24 hours have passed since the message was created.
    #[error("Edit window has expired")]
    EditWindowExpired,

    /// The reply target is missing, deleted, or in another conversation.
    #[error("Invalid reply reference: {0}")]
    InvalidReply(String),

    /// Input failed validation before touching the database.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The connection mutex was poisoned by a panicking thread.
    #[error("Store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Stable machine-readable cause word carried in `error` frames.
    pub fn reason(&self) -> &'static str {
        match self {
            StoreError::Sqlite(_) | StoreError::Poisoned => "internal",
            StoreError::NotFound => "not_found",
            StoreError::Unauthorized => "unauthorized",
            StoreError::EditWindowExpired => "edit_window_expired",
            StoreError::InvalidReply(_) => "invalid_reply",
            StoreError::Validation(_) => "validation",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Reasons a connection handshake is refused. Fatal to that attempt; the
/// rejection is reported in the closing `auth_response` frame.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No token provided")]
    Missing,

    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("User no longer exists")]
    UnknownUser,
}

/// Startup-time configuration failure.
#[derive(Error, Debug)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);
