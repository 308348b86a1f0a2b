//! Error types for Roost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RoostError>;

#[derive(Error, Debug)]
pub enum RoostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Remote platform error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid API key")]
    Unauthorized,
}

impl RoostError {
    /// HTTP status code an API boundary should map this error to.
    ///
    /// Internal detail (SQL errors, panic-free tracebacks) is never exposed;
    /// only the Display message of the variant crosses the boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            RoostError::InvalidInput(_) => 400,
            RoostError::Unauthorized => 401,
            RoostError::NotFound(_) => 404,
            RoostError::Conflict(_) => 409,
            RoostError::Credential(_) => 422,
            RoostError::Remote(_) => 502,
            RoostError::Config(_) | RoostError::Database(_) => 500,
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RoostError::InvalidInput(_) => 3,
            RoostError::Unauthorized => 2,
            RoostError::Credential(_) => 2,
            RoostError::NotFound(_) => 1,
            RoostError::Conflict(_) => 1,
            RoostError::Remote(_) => 1,
            RoostError::Config(_) => 1,
            RoostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failure reported by the remote platform.
///
/// `Api` carries the upstream status and body verbatim so diagnostics never
/// lose the platform's own explanation. `Transport` covers errors where no
/// HTTP response was received at all.
#[derive(Error, Debug, Clone)]
pub enum RemoteError {
    #[error("remote API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed remote response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Vault key is invalid: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Unsupported credential scheme: {0}")]
    UnsupportedScheme(String),
}
