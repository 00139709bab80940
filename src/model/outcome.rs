use thiserror::Error;

use crate::ledger::TxHash;
use crate::model::election::ElectionId;

/// The authoritative result of an operation, together with any advisory
/// side-effects that failed along the way.
///
/// Advisory failures never turn a success into an error: the session and
/// the ledger are the sources of truth, local voter flags are not.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub advisories: Vec<AdvisoryFailure>,
}

impl<T> Committed<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            advisories: Vec::new(),
        }
    }

    /// Record a failed side-effect. Also logs it, so callers may drop it.
    pub fn record(&mut self, failure: AdvisoryFailure) {
        warn!("{failure}");
        self.advisories.push(failure);
    }

    /// Did every side-effect succeed?
    pub fn is_clean(&self) -> bool {
        self.advisories.is_empty()
    }
}

/// A best-effort local write that did not stick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdvisoryFailure {
    #[error("Could not mark voter authenticated in election {election_id}: {reason}")]
    MarkAuthenticated {
        election_id: ElectionId,
        reason: String,
    },
    #[error("Could not advance session after relaying {tx_hash} in election {election_id}: {reason}")]
    AdvanceNonce {
        election_id: ElectionId,
        tx_hash: TxHash,
        reason: String,
    },
    #[error("Could not mark voter as having voted in election {election_id}: {reason}")]
    MarkVoted {
        election_id: ElectionId,
        reason: String,
    },
}
