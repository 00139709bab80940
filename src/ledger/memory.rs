//! In-memory ledger for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::model::election::{ChoiceId, ElectionId};

use super::{Ledger, LedgerError, TxHash, VoterKey};

#[derive(Default)]
struct State {
    voted: HashSet<VoterKey>,
    counts: HashMap<(ElectionId, ChoiceId), u64>,
    submissions: Vec<(ElectionId, VoterKey, ChoiceId)>,
    fail_submissions: bool,
    fail_queries: bool,
    submit_delay: Option<Duration>,
}

/// A ledger that records votes in memory.
///
/// Clones share state, so tests can inspect what was submitted.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<State>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Pretend a vote was already recorded under `key`, outside this server.
    pub fn mark_voted(&self, key: VoterKey) {
        self.state().voted.insert(key);
    }

    pub fn set_count(&self, election_id: ElectionId, choice_id: ChoiceId, count: u64) {
        self.state().counts.insert((election_id, choice_id), count);
    }

    pub fn submissions(&self) -> Vec<(ElectionId, VoterKey, ChoiceId)> {
        self.state().submissions.clone()
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state().fail_submissions = fail;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state().fail_queries = fail;
    }

    /// Make each submission take this long, to widen race windows.
    pub fn delay_submissions(&self, delay: Duration) {
        self.state().submit_delay = Some(delay);
    }

    fn check_queries(&self) -> Result<(), LedgerError> {
        if self.state().fail_queries {
            Err(LedgerError::Malformed("queries switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

#[rocket::async_trait]
impl Ledger for MemoryLedger {
    async fn has_voted(&self, key: &VoterKey) -> Result<bool, LedgerError> {
        self.check_queries()?;
        Ok(self.state().voted.contains(key))
    }

    async fn submit_vote(
        &self,
        election_id: ElectionId,
        key: &VoterKey,
        choice_id: ChoiceId,
    ) -> Result<TxHash, LedgerError> {
        let delay = self.state().submit_delay;
        if let Some(delay) = delay {
            rocket::tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_submissions {
            return Err(LedgerError::Rpc {
                code: -32000,
                message: "nonce too low".to_string(),
            });
        }
        // The contract reverts a second vote under the same key.
        if !state.voted.insert(*key) {
            return Err(LedgerError::Rpc {
                code: 3,
                message: "execution reverted: already voted".to_string(),
            });
        }
        *state.counts.entry((election_id, choice_id)).or_default() += 1;
        state.submissions.push((election_id, *key, choice_id));
        Ok(TxHash(format!("0x{:064x}", state.submissions.len())))
    }

    async fn choice_count(
        &self,
        election_id: ElectionId,
        choice_id: ChoiceId,
    ) -> Result<u64, LedgerError> {
        self.check_queries()?;
        Ok(self
            .state()
            .counts
            .get(&(election_id, choice_id))
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn second_vote_under_a_key_reverts() {
        let ledger = MemoryLedger::new();
        let key = VoterKey::derive("90010112345", 7, "pepper");

        ledger.submit_vote(7, &key, 2).await.unwrap();
        match ledger.submit_vote(7, &key, 3).await {
            Err(LedgerError::Rpc { code: 3, .. }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ledger.submissions(), vec![(7, key, 2)]);
        assert_eq!(ledger.choice_count(7, 2).await.unwrap(), 1);
        assert_eq!(ledger.choice_count(7, 3).await.unwrap(), 0);

        // Keys from other elections are independent.
        let other = VoterKey::derive("90010112345", 8, "pepper");
        ledger.submit_vote(8, &other, 3).await.unwrap();
    }
}
