//! Error types for Mirrorcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Seen store error: {0}")]
    Store(#[from] StoreError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MirrorError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::InvalidInput(_) => 3,
            MirrorError::Platform(PlatformError::Authentication(_)) => 2,
            MirrorError::Platform(_) => 1,
            MirrorError::Config(_) => 1,
            MirrorError::Database(_) => 1,
            MirrorError::Store(_) => 1,
            MirrorError::Media(_) => 1,
        }
    }

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MirrorError::Platform(PlatformError::Network(_))
                | MirrorError::Platform(PlatformError::Unreachable(_))
                | MirrorError::Platform(PlatformError::RateLimit(_))
        )
    }

    /// Whether the server certainly did not act on the request.
    ///
    /// Only these failures are safe to retry for requests that create
    /// something, such as a tweet or a link submission.
    pub fn is_unsent(&self) -> bool {
        matches!(
            self,
            MirrorError::Platform(PlatformError::Unreachable(_))
                | MirrorError::Platform(PlatformError::RateLimit(_))
        )
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

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Could not connect: {0}")]
    Unreachable(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already submitted: {0}")]
    AlreadySubmitted(String),
}

impl PlatformError {
    /// Classify a failed HTTP exchange by status code.
    pub fn from_status(platform: &str, context: &str, status: u16, body: &str) -> Self {
        let detail = format!("{} {} returned HTTP {}: {}", platform, context, status, body.trim());
        match status {
            401 | 403 => PlatformError::Authentication(detail),
            400 | 422 => PlatformError::Validation(detail),
            404 => PlatformError::NotFound(detail),
            429 => PlatformError::RateLimit(detail),
            500..=599 => PlatformError::Network(detail),
            _ => PlatformError::Posting(detail),
        }
    }
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return PlatformError::from_status("HTTP", "request", status.as_u16(), &error.to_string());
        }
        if error.is_decode() {
            return PlatformError::Posting(format!("Unexpected response body: {}", error));
        }
        if error.is_connect() {
            return PlatformError::Unreachable(error.to_string());
        }
        PlatformError::Network(error.to_string())
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(error: reqwest::Error) -> Self {
        MirrorError::Platform(error.into())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Posted but not recorded as seen: {0}")]
    Unrecorded(String),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("No usable media found at {0}")]
    Empty(String),
}
