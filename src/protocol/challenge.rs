use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::model::{
    challenge::{normalize_address, Challenge},
    signature::{recover_personal_signer, Address},
};
use crate::storage::Storage;

use super::AuthError;

/// Issues and consumes single-use proof-of-ownership challenges.
#[derive(Clone)]
pub struct ChallengeStore {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    /// Issue a fresh challenge for `address`, replacing any pending one, and
    /// return the nonce the wallet must sign.
    pub async fn issue(&self, address: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let purged = self.storage.purge_expired_challenges(now).await?;
        if purged > 0 {
            debug!("Purged {purged} expired challenges");
        }

        let challenge = Challenge::new(address, now + self.ttl);
        self.storage.upsert_challenge(&challenge).await?;
        debug!("Issued challenge for {}", challenge.address);
        Ok(challenge.nonce)
    }

    /// Check `signature` against the pending challenge for `address` and
    /// consume it. Returns the address the signature proves.
    pub async fn consume(&self, address: &str, signature: &str) -> Result<String, AuthError> {
        let key = normalize_address(address);
        let challenge = self
            .storage
            .find_challenge(&key)
            .await?
            .ok_or(AuthError::ChallengeNotFound)?;
        if challenge.is_expired_at(Utc::now()) {
            return Err(AuthError::ChallengeExpired);
        }

        let claimed: Address = key.parse().map_err(|_| AuthError::BadSignature)?;
        let signer = recover_personal_signer(&challenge.nonce, signature)?;
        if signer != claimed {
            debug!("Challenge for {key} signed by {signer}");
            return Err(AuthError::BadSignature);
        }

        // Someone else may have consumed or replaced it since we read it.
        if !self
            .storage
            .delete_challenge(&key, &challenge.nonce)
            .await?
        {
            return Err(AuthError::ChallengeNotFound);
        }

        Ok(address.trim().to_string())
    }
}
