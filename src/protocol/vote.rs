use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ledger::{Ledger, TxHash, VoterKey};
use crate::model::{
    election::{lenient_id, ChoiceId, ElectionId},
    outcome::{AdvisoryFailure, Committed},
    signature::{recover_personal_signer, Address},
};
use crate::storage::Storage;

use super::{
    error::{missing_names, present},
    ResultsError, SessionStore, VoteError,
};

/// A vote as submitted by the voter's client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBallot {
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub choice_id: Option<ChoiceId>,
    /// Signature over `vote:{election_id}:{choice_id}:{next_nonce}`.
    #[serde(default)]
    pub signature: Option<String>,
}

/// Proof that a vote was relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    #[serde(rename = "txHash")]
    pub tx_hash: TxHash,
    pub public_address: String,
    pub next_nonce: u64,
}

/// The on-chain tally of one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub choice_id: ChoiceId,
    pub name: String,
    pub votes: u64,
}

/// Checks signed votes against their sessions and relays them to the
/// ledger.
#[derive(Clone)]
pub struct VoteRelay {
    storage: Arc<dyn Storage>,
    ledger: Arc<dyn Ledger>,
    sessions: SessionStore,
    secret_salt: String,
}

impl VoteRelay {
    pub fn new(
        storage: Arc<dyn Storage>,
        ledger: Arc<dyn Ledger>,
        sessions: SessionStore,
        secret_salt: &str,
    ) -> Self {
        Self {
            storage,
            ledger,
            sessions,
            secret_salt: secret_salt.to_string(),
        }
    }

    pub async fn cast_vote(
        &self,
        election_id: ElectionId,
        ballot: &VoteBallot,
    ) -> Result<Committed<VoteReceipt>, VoteError> {
        let fields = (
            present(&ballot.session_token),
            ballot.choice_id,
            present(&ballot.signature),
        );
        let (Some(token), Some(choice_id), Some(signature)) = fields else {
            return Err(VoteError::MissingFields(missing_names(&[
                ("session_token", fields.0.is_none()),
                ("choice_id", fields.1.is_none()),
                ("signature", fields.2.is_none()),
            ])));
        };

        let _session_guard = self
            .sessions
            .try_lock(token)
            .ok_or(VoteError::ConcurrentVoteConflict)?;

        let session = self
            .sessions
            .lookup(token, election_id)
            .await?
            .ok_or(VoteError::InvalidSession)?;
        if self.sessions.is_expired(&session) {
            return Err(VoteError::SessionExpired);
        }

        let election = self
            .storage
            .find_election(election_id)
            .await?
            .ok_or(VoteError::ElectionNotFound)?;
        if !election.is_active_at(Utc::now()) {
            return Err(VoteError::ElectionNotActive);
        }

        let voter = self
            .storage
            .find_voter(&session.pesel, election_id)
            .await?
            .ok_or(VoteError::VoterNotFound)?;
        // A voter may hold several sessions; only one of them may be relaying.
        let _voter_guard = self
            .sessions
            .try_lock_voter(&voter.pesel, election_id)
            .ok_or(VoteError::ConcurrentVoteConflict)?;
        if voter.has_voted {
            return Err(VoteError::AlreadyVotedLocal);
        }

        let message = session.vote_message(choice_id);
        let signer = recover_personal_signer(&message, signature)?;
        let bound: Address = session
            .public_address
            .parse()
            .map_err(|_| VoteError::BadSignature)?;
        if signer != bound {
            debug!("Vote for session bound to {bound} signed by {signer}");
            return Err(VoteError::BadSignature);
        }

        let key = VoterKey::derive(&session.pesel, election_id, &self.secret_salt);
        if self
            .ledger
            .has_voted(&key)
            .await
            .map_err(VoteError::RelayFailed)?
        {
            return Err(VoteError::AlreadyVotedOnChain);
        }

        let tx_hash = self
            .ledger
            .submit_vote(election_id, &key, choice_id)
            .await
            .map_err(|err| {
                error!("Relaying vote in election {election_id} failed: {err}");
                VoteError::RelayFailed(err)
            })?;

        // The vote is on the ledger now. Nothing below may turn it into an error.
        let (next_nonce, not_advanced) = match self.sessions.advance_nonce(&session).await {
            Ok(Some(updated)) => (updated.next_nonce, None),
            Ok(None) => (
                session.next_nonce + 1,
                Some("session nonce moved concurrently".to_string()),
            ),
            Err(err) => (session.next_nonce + 1, Some(err.to_string())),
        };
        let mut committed = Committed::new(VoteReceipt {
            tx_hash: tx_hash.clone(),
            public_address: session.public_address.clone(),
            next_nonce,
        });
        if let Some(reason) = not_advanced {
            error!("Vote relayed as {tx_hash} but its session was not advanced: {reason}");
            committed.record(AdvisoryFailure::AdvanceNonce {
                election_id,
                tx_hash,
                reason,
            });
        }
        if let Err(err) = self.storage.mark_voter_voted(&voter.pesel, election_id).await {
            committed.record(AdvisoryFailure::MarkVoted {
                election_id,
                reason: err.to_string(),
            });
        }
        Ok(committed)
    }

    /// Per-choice tallies, once the election is over.
    pub async fn results(&self, election_id: ElectionId) -> Result<Vec<ChoiceTally>, ResultsError> {
        let election = self
            .storage
            .find_election(election_id)
            .await?
            .ok_or(ResultsError::ElectionNotFound)?;
        if !election.is_finished_at(Utc::now()) {
            return Err(ResultsError::ElectionNotFinished);
        }

        let mut results = Vec::with_capacity(election.choices.len());
        for choice in election.choices {
            let votes = self
                .ledger
                .choice_count(election_id, choice.id)
                .await
                .map_err(ResultsError::LedgerQueryFailed)?;
            results.push(ChoiceTally {
                choice_id: choice.id,
                name: choice.name,
                votes,
            });
        }
        Ok(results)
    }
}
