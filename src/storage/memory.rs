//! In-memory storage for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::model::{
    challenge::Challenge,
    election::{Election, ElectionFilter, ElectionId},
    session::VotingSession,
    voter::Voter,
};

use super::{Storage, StorageError};

#[derive(Default)]
struct Tables {
    challenges: HashMap<String, Challenge>,
    sessions: HashMap<String, VotingSession>,
    elections: HashMap<ElectionId, Election>,
    voters: HashMap<(String, ElectionId), Voter>,
    fail_voter_writes: bool,
    unavailable: bool,
}

/// A storage backend that keeps everything in memory.
///
/// Clones share the same tables, so a test can keep a handle to inspect
/// what the server wrote.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap()
    }

    fn check_available(tables: &Tables) -> Result<(), StorageError> {
        if tables.unavailable {
            Err(StorageError::Unavailable("memory storage switched off".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn insert_election(&self, election: Election) {
        self.tables().elections.insert(election.id, election);
    }

    pub fn insert_voter(&self, voter: Voter) {
        self.tables()
            .voters
            .insert((voter.pesel.clone(), voter.election_id), voter);
    }

    pub fn insert_challenge(&self, challenge: Challenge) {
        self.tables()
            .challenges
            .insert(challenge.address.clone(), challenge);
    }

    pub fn insert_session_directly(&self, session: VotingSession) {
        self.tables()
            .sessions
            .insert(session.session_id.clone(), session);
    }

    pub fn voter(&self, pesel: &str, election_id: ElectionId) -> Option<Voter> {
        self.tables()
            .voters
            .get(&(pesel.to_string(), election_id))
            .cloned()
    }

    pub fn session(&self, session_id: &str) -> Option<VotingSession> {
        self.tables().sessions.get(session_id).cloned()
    }

    pub fn sessions(&self) -> Vec<VotingSession> {
        self.tables().sessions.values().cloned().collect()
    }

    pub fn challenge(&self, address: &str) -> Option<Challenge> {
        self.tables().challenges.get(address).cloned()
    }

    /// Make the advisory voter-flag writes fail.
    pub fn fail_voter_writes(&self, fail: bool) {
        self.tables().fail_voter_writes = fail;
    }

    /// Make every operation fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.tables().unavailable = unavailable;
    }
}

#[rocket::async_trait]
impl Storage for MemoryStorage {
    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<(), StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        tables
            .challenges
            .insert(challenge.address.clone(), challenge.clone());
        Ok(())
    }

    async fn find_challenge(&self, address: &str) -> Result<Option<Challenge>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        Ok(tables.challenges.get(address).cloned())
    }

    async fn delete_challenge(&self, address: &str, nonce: &str) -> Result<bool, StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        let current = tables
            .challenges
            .get(address)
            .map_or(false, |challenge| challenge.nonce == nonce);
        if current {
            tables.challenges.remove(address);
        }
        Ok(current)
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        let before = tables.challenges.len();
        tables.challenges.retain(|_, c| !c.is_expired_at(now));
        Ok((before - tables.challenges.len()) as u64)
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<(), StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        tables
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        Ok(tables
            .sessions
            .get(session_id)
            .filter(|s| s.election_id == election_id && s.is_verified)
            .cloned())
    }

    async fn advance_session_nonce(
        &self,
        session_id: &str,
        expected: u64,
    ) -> Result<Option<VotingSession>, StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        Ok(match tables.sessions.get_mut(session_id) {
            Some(session) if session.next_nonce == expected => {
                session.next_nonce += 1;
                session.has_voted = true;
                Some(session.clone())
            }
            _ => None,
        })
    }

    async fn purge_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.created_at >= cutoff);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn find_election(&self, id: ElectionId) -> Result<Option<Election>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        Ok(tables.elections.get(&id).cloned())
    }

    async fn list_elections(
        &self,
        filter: &ElectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Election>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        let mut elections: Vec<_> = tables
            .elections
            .values()
            .filter(|e| filter.matches(e, now))
            .cloned()
            .collect();
        elections.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(elections)
    }

    async fn find_voter_by_credentials(
        &self,
        pesel: &str,
        election_id: ElectionId,
        verification_code: &str,
    ) -> Result<Option<Voter>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        Ok(tables
            .voters
            .get(&(pesel.to_string(), election_id))
            .filter(|v| v.verification_code == verification_code)
            .cloned())
    }

    async fn find_voter(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<Option<Voter>, StorageError> {
        let tables = self.tables();
        Self::check_available(&tables)?;
        Ok(tables.voters.get(&(pesel.to_string(), election_id)).cloned())
    }

    async fn mark_voter_authenticated(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        if tables.fail_voter_writes {
            return Err(StorageError::Unavailable("voter writes disabled".to_string()));
        }
        if let Some(voter) = tables.voters.get_mut(&(pesel.to_string(), election_id)) {
            voter.is_authenticated = true;
        }
        Ok(())
    }

    async fn mark_voter_voted(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables();
        Self::check_available(&tables)?;
        if tables.fail_voter_writes {
            return Err(StorageError::Unavailable("voter writes disabled".to_string()));
        }
        if let Some(voter) = tables.voters.get_mut(&(pesel.to_string(), election_id)) {
            voter.has_voted = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn conditional_nonce_advance() {
        let storage = MemoryStorage::new();
        let session = VotingSession::new("90010112345", "a@b.c", 1, "0xabc");
        storage.insert_session(&session).await.unwrap();

        let advanced = storage
            .advance_session_nonce(&session.session_id, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.next_nonce, 2);
        assert!(advanced.has_voted);

        // Stale expectation.
        assert_eq!(
            storage
                .advance_session_nonce(&session.session_id, 1)
                .await
                .unwrap(),
            None
        );
        assert_eq!(storage.session(&session.session_id).unwrap().next_nonce, 2);
    }

    #[rocket::async_test]
    async fn conditional_challenge_delete() {
        let storage = MemoryStorage::new();
        let challenge = Challenge::new("0xabc", Utc::now());
        storage.upsert_challenge(&challenge).await.unwrap();

        assert!(!storage.delete_challenge("0xabc", "evote:other").await.unwrap());
        assert!(storage
            .delete_challenge("0xabc", &challenge.nonce)
            .await
            .unwrap());
        assert!(!storage
            .delete_challenge("0xabc", &challenge.nonce)
            .await
            .unwrap());
    }

    #[rocket::async_test]
    async fn elections_listed_latest_first() {
        let storage = MemoryStorage::new();
        storage.insert_election(Election::finished_example(1));
        storage.insert_election(Election::upcoming_example(2));
        storage.insert_election(Election::active_example(3));

        let ids: Vec<_> = storage
            .list_elections(&ElectionFilter::default(), Utc::now())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
