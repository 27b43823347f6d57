//! Error types for the remote mailbox service and the poll worker.
//!
//! Errors fall into two groups. [`ServiceError`] covers a single remote
//! call and is treated as transient by the poll loop. [`WatchError`] ends
//! the run: it is only produced before polling starts.

use mailbox_types::QueryError;
use thiserror::Error;

/// Failure of a single call to the remote mailbox service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Endpoint URL could not be parsed
    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    /// Transport failure, including request timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status without a parseable SOAP fault
    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Error reported by the server in a response message or SOAP fault
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    /// Response body was not the XML we expected
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ServiceError::Malformed(message.into())
    }
}

impl From<quick_xml::Error> for ServiceError {
    fn from(err: quick_xml::Error) -> Self {
        ServiceError::Malformed(err.to_string())
    }
}

/// Terminal failure of a watch run
#[derive(Debug, Error)]
pub enum WatchError {
    /// Listing the subfolders of the parent folder failed
    #[error("Failed to list folders: {0}")]
    FolderListing(#[source] ServiceError),

    /// The item view or filter could not be built
    #[error("Failed to set up query: {0}")]
    Query(#[from] QueryError),
}
