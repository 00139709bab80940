//! Persistence for challenges, sessions, and the externally-managed
//! election and voter records.

use chrono::{DateTime, Utc};
use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    challenge::Challenge,
    election::{Election, ElectionFilter, ElectionId},
    session::VotingSession,
    voter::Voter,
};

#[cfg(test)]
mod memory;
mod mongo;

#[cfg(test)]
pub use memory::MemoryStorage;
pub use mongo::{ensure_indexes_exist, Coll, MongoCollection, MongoStorage};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Everything the protocol needs to persist or look up.
///
/// Every operation is a single atomic step against the backing store;
/// multi-step invariants are the caller's business.
#[rocket::async_trait]
pub trait Storage: Send + Sync {
    /// Insert the challenge, replacing any existing one for the same address.
    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<(), StorageError>;

    async fn find_challenge(&self, address: &str) -> Result<Option<Challenge>, StorageError>;

    /// Delete the challenge for `address`, but only if it still carries
    /// `nonce`. Returns whether anything was deleted.
    async fn delete_challenge(&self, address: &str, nonce: &str) -> Result<bool, StorageError>;

    /// Delete all challenges that expired before `now`.
    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;

    async fn insert_session(&self, session: &VotingSession) -> Result<(), StorageError>;

    /// Find a verified session for the given election.
    async fn find_session(
        &self,
        session_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>, StorageError>;

    /// Atomically increment `next_nonce` and set `has_voted`, but only if
    /// `next_nonce` still equals `expected`. Returns the updated session,
    /// or `None` if the condition did not hold.
    async fn advance_session_nonce(
        &self,
        session_id: &str,
        expected: u64,
    ) -> Result<Option<VotingSession>, StorageError>;

    /// Delete all sessions created before `cutoff`.
    async fn purge_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    async fn find_election(&self, id: ElectionId) -> Result<Option<Election>, StorageError>;

    /// All matching elections, latest start first.
    async fn list_elections(
        &self,
        filter: &ElectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Election>, StorageError>;

    /// Find a voter whose identity and verification code all match exactly.
    async fn find_voter_by_credentials(
        &self,
        pesel: &str,
        election_id: ElectionId,
        verification_code: &str,
    ) -> Result<Option<Voter>, StorageError>;

    async fn find_voter(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<Option<Voter>, StorageError>;

    async fn mark_voter_authenticated(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<(), StorageError>;

    async fn mark_voter_voted(&self, pesel: &str, election_id: ElectionId)
        -> Result<(), StorageError>;
}
