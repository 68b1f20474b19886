//! Unified error types for opsdash.
//!
//! Every variant renders with a stable upper-case code prefix so the
//! published `error` string stays greppable in the dashboard.

/// Unified error types for the query-synchronization layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Transport-level failure: no response was received.
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// A response arrived but was non-2xx or carried `success: false`.
    #[error("SERVER_ERROR: {detail}")]
    Server { status: Option<u16>, detail: String },

    /// A resolution arrived for a superseded sequence.
    #[error("CANCELLED: sequence {sequence} superseded")]
    Cancelled { sequence: u64 },

    /// Parameter normalization or payload decoding failed.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Malformed caller input.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build a server error from an HTTP status and optional body detail.
    pub fn server(status: Option<u16>, detail: Option<String>) -> Self {
        let detail = match (detail, status) {
            (Some(detail), _) if !detail.is_empty() => detail,
            (_, Some(status)) => format!("HTTP {status}"),
            (_, None) => "request failed".to_string(),
        };
        Error::Server { status, detail }
    }

    /// Whether this error should ever reach the published `error` field.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Error::Cancelled { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
