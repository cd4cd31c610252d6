/*!
 * Error types for relaynode
 *
 * Two tiers:
 * - `RequestError`: the caller sent something malformed. Surfaces as an
 *   `INVALID_ARGUMENT` transport status and no collaborator is touched.
 * - `NodeError`: a collaborator (store, daemon, collector) failed. The facade
 *   folds these into a `success = false` envelope.
 */

use crate::model::InboundKey;
use thiserror::Error;
use tonic::Status;

pub type Result<T> = std::result::Result<T, NodeError>;

/// Caller-error tier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("invalid time range: end {end} precedes start {start}")]
    InvalidTimeRange { start: i64, end: i64 },
}

impl RequestError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        RequestError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<RequestError> for Status {
    fn from(err: RequestError) -> Self {
        Status::invalid_argument(err.to_string())
    }
}

/// Collaborator-error tier.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("config store error: {0}")]
    Store(String),

    #[error("daemon control failed: {0}")]
    Daemon(String),

    #[error("status collection failed: {0}")]
    Collector(String),

    /// The collector answered, but with figures that cannot be reported.
    #[error("invalid collector data: {0}")]
    InvalidData(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("gRPC transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// First failing record of a multi-record call.
    #[error("record #{index} ({key}): {source}")]
    Record {
        index: usize,
        key: InboundKey,
        #[source]
        source: Box<NodeError>,
    },
}

impl NodeError {
    /// Whether this failure came from the caller's deadline rather than the
    /// collaborator itself.
    pub fn is_deadline(&self) -> bool {
        match self {
            NodeError::DeadlineExceeded => true,
            NodeError::Record { source, .. } => source.is_deadline(),
            _ => false,
        }
    }
}
