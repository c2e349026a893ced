//! Unified error types for seiche.

/// Errors surfaced by the cache, configuration, and transport layers.
///
/// Transport failures are propagated as terminal errors and never retried
/// at this layer; retry policy belongs to the transport collaborator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL construction failed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Network or connection failure during a fetch or stream.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout")]
    Timeout,

    /// Non-success HTTP status without a more specific mapping.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// The remote store has no document with this id.
    #[error("document not found: {id}")]
    NotFound { id: String },

    /// The remote store rejected a write due to a revision mismatch.
    ///
    /// Surfaced to the caller as-is; this layer does not merge or retry.
    #[error("write conflict on document: {id}")]
    WriteConflict { id: String },

    /// Response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// A document without an `_id` reached an operation that requires one.
    #[error("document has no id")]
    MissingId,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
