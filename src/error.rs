//! Error types for the live chat ingestion pipeline
//!
//! Each concern gets its own `thiserror` enum; [`Error`] aggregates them for
//! callers that only want a single `Result` type.

use thiserror::Error;

/// The main error type for ingestion operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Scraping session errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Webhook verification errors
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    /// Browser already closed
    #[error("Browser already closed")]
    AlreadyClosed,
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),

    /// Reading the rendered page failed
    #[error("Failed to read page source: {0}")]
    SourceUnavailable(String),
}

/// Scraping session failures, one variant per severity class
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// `start()` was called while a run is still active
    #[error("Scraper is already running (state: {0})")]
    AlreadyRunning(String),

    /// The channel identifier cannot form a valid target
    #[error("Invalid channel id: {0:?}")]
    InvalidChannel(String),

    /// The remote session could not be acquired
    #[error("Failed to acquire session: {0}")]
    Acquisition(String),

    /// The target channel page does not exist
    #[error("Channel page not found: {0}")]
    ResourceNotFound(String),

    /// Unexpected failure inside the poll loop
    #[error("Poll loop failed: {0}")]
    LoopFatal(String),
}

impl SessionError {
    /// Whether this error ends the current run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::AlreadyRunning(_))
    }
}

/// Why a webhook request failed authentication
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The verifying key could not be loaded at startup
    #[error("Public key not loaded")]
    KeyUnavailable,

    /// A required header was absent or empty
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// The signature header was not valid base64
    #[error("Malformed signature encoding: {0}")]
    MalformedSignature(String),

    /// The signature did not match the signed content
    #[error("Signature mismatch")]
    Mismatch,
}

/// A verified webhook body that carries no usable chat message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// The body is not a JSON object of the expected shape
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    /// No message text in any known field
    #[error("Message content is empty")]
    EmptyContent,

    /// Neither the payload nor the delivery headers carry an id
    #[error("Message id is missing")]
    MissingId,
}

/// A single chat entry that could not be extracted from a page snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Skipped chat entry #{index}: {reason}")]
pub struct ParseIssue {
    /// Position of the fragment within the snapshot
    pub index: usize,
    /// What was wrong with it
    pub reason: String,
    /// First characters of the offending fragment
    pub snippet: String,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable held an unparsable value
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name
        key: String,
        /// Raw value
        value: String,
    },

    /// A value parsed but is out of range
    #[error("{0}")]
    OutOfRange(String),
}

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}
