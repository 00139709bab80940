use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use crate::model::{election::ElectionId, session::VotingSession};
use crate::storage::{Storage, StorageError};

/// Creates, finds, and advances voting sessions.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    ttl: Duration,
    locks: SessionLocks,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self {
            storage,
            ttl,
            locks: SessionLocks::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn create(
        &self,
        pesel: &str,
        email: &str,
        election_id: ElectionId,
        public_address: &str,
    ) -> Result<VotingSession, StorageError> {
        let session = VotingSession::new(pesel, email, election_id, public_address);
        self.storage.insert_session(&session).await?;
        Ok(session)
    }

    /// A verified session for this election, if there is one.
    pub async fn lookup(
        &self,
        session_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>, StorageError> {
        self.storage.find_session(session_id, election_id).await
    }

    pub fn is_expired(&self, session: &VotingSession) -> bool {
        session.is_expired_at(self.ttl, Utc::now())
    }

    /// Move the session past the nonce it was read with and mark it as having
    /// voted. `None` means someone else advanced it first.
    pub async fn advance_nonce(
        &self,
        session: &VotingSession,
    ) -> Result<Option<VotingSession>, StorageError> {
        self.storage
            .advance_session_nonce(&session.session_id, session.next_nonce)
            .await
    }

    /// Delete sessions that are past their TTL.
    pub async fn purge_expired(&self) -> Result<u64, StorageError> {
        self.storage
            .purge_sessions_created_before(Utc::now() - self.ttl)
            .await
    }

    /// Enter the critical section for `session_id`, or `None` if another
    /// request is already inside it.
    pub fn try_lock(&self, session_id: &str) -> Option<SessionGuard> {
        self.locks.try_lock(&format!("session:{session_id}"))
    }

    /// As [`Self::try_lock`], but for every session the voter holds in the
    /// election.
    pub fn try_lock_voter(&self, pesel: &str, election_id: ElectionId) -> Option<SessionGuard> {
        self.locks.try_lock(&format!("voter:{election_id}:{pesel}"))
    }
}

/// In-process set of sessions and voters with a vote in flight.
#[derive(Clone, Default)]
pub struct SessionLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SessionLocks {
    pub fn try_lock(&self, key: &str) -> Option<SessionGuard> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.insert(key.to_string()) {
            Some(SessionGuard {
                held: self.held.clone(),
                key: key.to_string(),
            })
        } else {
            None
        }
    }
}

/// Releases the lock when dropped.
pub struct SessionGuard {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.key);
    }
}
