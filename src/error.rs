//! Dispatch error taxonomy
//!
//! Every failure a round can end with. Errors are `Clone` because a single
//! failed round result is handed to every caller waiting on the barrier.
//!
//! All variants are recovered at the service boundary and turned into a
//! failure reply (`status = -1`, no payload); none of them tear down the
//! serving loop.

use thiserror::Error;

/// Status code carried by a successful reply
pub const STATUS_OK: i32 = 0;

/// Status code carried by every failure reply
pub const STATUS_FAILED: i32 = -1;

/// Failure of a barriered or bypass call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A caller submitted a mismatched operation, an unexpected caller id,
    /// or called out of sequence.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The local handler or a peer's handler raised an error.
    ///
    /// `operation` is the call name: an operation or a bypass call.
    #[error("{operation} failed: {reason}")]
    OperationFailed { operation: &'static str, reason: String },

    /// Peers returned inconsistent results where unanimity was required.
    #[error("peers disagree on {operation}: {detail}")]
    QuorumDisagreement { operation: &'static str, detail: String },

    /// Some expected caller never submitted within the barrier timeout.
    #[error("timed out waiting for participants: {}", missing.join(", "))]
    ParticipantTimeout { missing: Vec<String> },

    /// A peer call could not complete.
    #[error("peer {peer} unreachable: {reason}")]
    TransportFailure { peer: String, reason: String },
}

impl DispatchError {
    /// Shorthand for a `ProtocolViolation`
    pub fn violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Short machine-readable name, used in logs and failure replies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProtocolViolation(_) => "protocol-violation",
            Self::OperationFailed { .. } => "operation-failed",
            Self::QuorumDisagreement { .. } => "quorum-disagreement",
            Self::ParticipantTimeout { .. } => "participant-timeout",
            Self::TransportFailure { .. } => "transport-failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_lists_missing_participants() {
        let err = DispatchError::ParticipantTimeout {
            missing: vec!["bob".to_string(), "carol".to_string()],
        };
        assert_eq!(err.to_string(), "timed out waiting for participants: bob, carol");
        assert_eq!(err.kind(), "participant-timeout");
    }

    #[test]
    fn test_operation_in_message() {
        let err = DispatchError::QuorumDisagreement {
            operation: "row-count",
            detail: "peer 2 returned 101".to_string(),
        };
        assert_eq!(err.to_string(), "peers disagree on row-count: peer 2 returned 101");
    }
}
