//! Campus Chat - polling-based real-time chat for the campus portal
//!
//! This library provides the chat layer used by the portal screens: one
//! polling loop per open conversation over the REST messaging API, with
//! cursor-based de-duplication, a retry budget for server errors and event
//! fan-out to UI listeners.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod events;
pub mod message;
pub mod realtime;
pub mod session;
pub mod transport;

pub use config::ChatConfig;
pub use events::{ChatEvent, EventKind, ListenerId};
pub use message::{ConversationKey, Message};
pub use realtime::ChatPollingService;
pub use session::SessionHealth;
pub use transport::{HttpBackend, MessagingBackend};

/// Result type alias for campus chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for campus chat operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The backend answered with a 5xx status
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The backend answered with a non-success, non-5xx status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// No response from the backend (unreachable, timeout, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error counts against a polling session's retry budget
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Server { .. })
    }
}

/// Initialize logging for campus chat
///
/// Reads the filter from `RUST_LOG`, falling back to `info`.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests;
