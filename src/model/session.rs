use chrono::{DateTime, Duration, Utc};
use data_encoding::HEXLOWER;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::model::election::{ChoiceId, ElectionId};

/// Number of random bytes in a session token.
const TOKEN_BYTES: usize = 16;

/// The first vote nonce of every session.
pub const FIRST_VOTE_NONCE: u64 = 1;

/// A voter's session after passing verification, scoped to one election
/// and one wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSession {
    /// Opaque bearer token handed to the client.
    #[serde(rename = "_id")]
    pub session_id: String,
    pub pesel: String,
    pub email: String,
    pub election_id: ElectionId,
    /// The address that proved ownership during verification. Votes must be
    /// signed by the same address.
    pub public_address: String,
    pub is_verified: bool,
    pub has_voted: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    /// The nonce the next vote signature must commit to.
    pub next_nonce: u64,
}

impl VotingSession {
    /// Open a new verified session with a fresh random token.
    pub fn new(pesel: &str, email: &str, election_id: ElectionId, public_address: &str) -> Self {
        let mut bytes = [0; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            session_id: HEXLOWER.encode(&bytes),
            pesel: pesel.to_string(),
            email: email.to_string(),
            election_id,
            public_address: public_address.to_string(),
            is_verified: true,
            has_voted: false,
            created_at: Utc::now(),
            next_nonce: FIRST_VOTE_NONCE,
        }
    }

    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }

    /// The message the voter must sign to cast their next vote.
    pub fn vote_message(&self, choice_id: ChoiceId) -> String {
        vote_message(self.election_id, choice_id, self.next_nonce)
    }
}

/// The canonical vote message. Binding the nonce in stops a signed vote
/// from being replayed once the session has moved on.
pub fn vote_message(election_id: ElectionId, choice_id: ChoiceId, nonce: u64) -> String {
    format!("vote:{election_id}:{choice_id}:{nonce}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session() {
        let session = VotingSession::new("90010112345", "a@b.c", 7, "0xAbC");
        assert_eq!(session.session_id.len(), TOKEN_BYTES * 2);
        assert_eq!(session.next_nonce, 1);
        assert!(session.is_verified);
        assert!(!session.has_voted);
        assert_eq!(session.public_address, "0xAbC");
        assert_ne!(
            session.session_id,
            VotingSession::new("90010112345", "a@b.c", 7, "0xAbC").session_id
        );
    }

    #[test]
    fn canonical_message() {
        let session = VotingSession::new("90010112345", "a@b.c", 7, "0xabc");
        assert_eq!(session.vote_message(2), "vote:7:2:1");
        assert_eq!(vote_message(12, 0, 40), "vote:12:0:40");
    }

    #[test]
    fn expiry() {
        let session = VotingSession::new("90010112345", "a@b.c", 7, "0xabc");
        let ttl = Duration::hours(1);
        assert!(!session.is_expired_at(ttl, session.created_at + ttl));
        assert!(session.is_expired_at(ttl, session.created_at + ttl + Duration::seconds(1)));
    }
}
