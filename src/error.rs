use thiserror::Error;

use crate::tracker::TrackerPhase;

/// Errors surfaced by the stake trackers.
///
/// Three classes flow through this type:
/// - logic errors: an event contradicts what we assume about its source
///   (fatal, abort the whole load),
/// - caller misuse: the tracker was driven out of order,
/// - upstream failures from a gateway, propagated as-is.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no resolved timestamp for block {block_number}")]
    MissingTimestamp { block_number: u64 },

    #[error("transfer of {amount} from the zero address to the zero address (tx {tx_hash})")]
    DegenerateTransfer { amount: String, tx_hash: String },

    #[error("transfer {from} -> {to} on supply-tracked token is neither a mint nor a burn")]
    NotMintOrBurn { from: String, to: String },

    #[error("event for pool {found} does not match tracked pool {expected}")]
    PoolMismatch { expected: String, found: String },

    #[error("token at position {index} is {found}, expected tracked token {expected}")]
    UnexpectedToken {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("swap {token_in} -> {token_out} must involve tracked token {tracked} on exactly one side")]
    SwapWithoutTrackedToken {
        token_in: String,
        token_out: String,
        tracked: String,
    },

    #[error("malformed event in tx {tx_hash}: {reason}")]
    MalformedEvent { tx_hash: String, reason: String },

    #[error("unexpected {found} event in the {pipeline} pipeline")]
    UnexpectedEvent {
        pipeline: &'static str,
        found: &'static str,
    },

    #[error("invalid block range [{start_block}, {end_block}]")]
    InvalidRange { start_block: u64, end_block: u64 },

    #[error("{0} has already been loaded")]
    AlreadyLoaded(&'static str),

    #[error("operation not allowed in tracker phase {0:?}")]
    NotReady(TrackerPhase),

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl TrackerError {
    /// A broken assumption about an event source. Never recovered locally.
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            TrackerError::MissingTimestamp { .. }
                | TrackerError::DegenerateTransfer { .. }
                | TrackerError::NotMintOrBurn { .. }
                | TrackerError::PoolMismatch { .. }
                | TrackerError::UnexpectedToken { .. }
                | TrackerError::SwapWithoutTrackedToken { .. }
                | TrackerError::MalformedEvent { .. }
                | TrackerError::UnexpectedEvent { .. }
        )
    }

    /// The caller drove the tracker out of order or with bad arguments.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TrackerError::InvalidRange { .. }
                | TrackerError::AlreadyLoaded(_)
                | TrackerError::NotReady(_)
        )
    }
}

pub type Result<T, E = TrackerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes_are_disjoint() {
        let logic = TrackerError::MissingTimestamp { block_number: 7 };
        assert!(logic.is_logic_error());
        assert!(!logic.is_misuse());

        let misuse = TrackerError::NotReady(TrackerPhase::SnapshotReady);
        assert!(misuse.is_misuse());
        assert!(!misuse.is_logic_error());

        let upstream = TrackerError::from(anyhow::anyhow!("connection reset"));
        assert!(!upstream.is_logic_error());
        assert!(!upstream.is_misuse());
        assert_eq!(upstream.to_string(), "connection reset");
    }

    #[test]
    fn test_error_display() {
        let err = TrackerError::NotMintOrBurn {
            from: "0xaa".to_string(),
            to: "0xbb".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transfer 0xaa -> 0xbb on supply-tracked token is neither a mint nor a burn"
        );
    }
}
