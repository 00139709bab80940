//! The on-chain ledger that records who has voted and the running tallies.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{
    election::{ChoiceId, ElectionId},
    signature::{encode_hex, keccak256},
};

pub mod abi;
mod eth;
#[cfg(test)]
mod memory;
pub mod rpc;
pub mod transaction;

pub use eth::{EthLedger, FeeSchedule, TxStatus};
#[cfg(test)]
pub use memory::MemoryLedger;

/// The pseudonymous key under which a voter's participation is recorded
/// on-chain. Unlinkable to the voter without the secret salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoterKey([u8; 32]);

impl VoterKey {
    /// `keccak256("{pesel}:{election_id}:{salt}")`.
    pub fn derive(pesel: &str, election_id: ElectionId, salt: &str) -> Self {
        Self(keccak256(format!("{pesel}:{election_id}:{salt}")))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Display for VoterKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&encode_hex(self.0))
    }
}

/// Reference to a submitted transaction, as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl Display for TxHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Ledger node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Malformed ledger response: {0}")]
    Malformed(String),
    #[error("Could not sign transaction: {0}")]
    Signing(String),
}

/// Operations on the voting contract.
#[rocket::async_trait]
pub trait Ledger: Send + Sync {
    /// Has a vote already been recorded under this key?
    async fn has_voted(&self, key: &VoterKey) -> Result<bool, LedgerError>;

    /// Record a vote, returning the hash of the accepted transaction.
    async fn submit_vote(
        &self,
        election_id: ElectionId,
        key: &VoterKey,
        choice_id: ChoiceId,
    ) -> Result<TxHash, LedgerError>;

    /// Current tally for one choice.
    async fn choice_count(
        &self,
        election_id: ElectionId,
        choice_id: ChoiceId,
    ) -> Result<u64, LedgerError>;
}
