use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::{
    election::{lenient_id, ElectionId},
    outcome::{AdvisoryFailure, Committed},
};
use crate::storage::Storage;

use super::{
    error::{missing_names, present},
    AuthError, ChallengeStore, SessionStore,
};

/// Proof of wallet ownership plus the voter's credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub pesel: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub election_id: Option<ElectionId>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// What a voter gets back after verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_token: String,
    pub public_address: String,
    pub next_nonce: u64,
    pub expires_in_seconds: i64,
}

/// Challenge-response authentication of voters.
#[derive(Clone)]
pub struct AuthEngine {
    storage: Arc<dyn Storage>,
    challenges: ChallengeStore,
    sessions: SessionStore,
}

impl AuthEngine {
    pub fn new(storage: Arc<dyn Storage>, challenges: ChallengeStore, sessions: SessionStore) -> Self {
        Self {
            storage,
            challenges,
            sessions,
        }
    }

    /// Start proving ownership of `address`. Returns the text to sign.
    pub async fn begin_challenge(&self, address: Option<&str>) -> Result<String, AuthError> {
        match address {
            Some(address) if !address.trim().is_empty() => self.challenges.issue(address).await,
            _ => Err(AuthError::MissingFields("address".to_string())),
        }
    }

    /// Finish proving ownership and open a voting session.
    pub async fn verify(&self, request: &VerifyRequest) -> Result<Committed<SessionInfo>, AuthError> {
        let fields = (
            present(&request.pesel),
            present(&request.code),
            request.election_id,
            present(&request.address),
            present(&request.signature),
        );
        let (Some(pesel), Some(code), Some(election_id), Some(address), Some(signature)) = fields
        else {
            return Err(AuthError::MissingFields(missing_names(&[
                ("pesel", fields.0.is_none()),
                ("code", fields.1.is_none()),
                ("election_id", fields.2.is_none()),
                ("address", fields.3.is_none()),
                ("signature", fields.4.is_none()),
            ])));
        };

        let address = self.challenges.consume(address, signature).await?;

        let voter = self
            .storage
            .find_voter_by_credentials(pesel, election_id, code)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let session = self
            .sessions
            .create(&voter.pesel, &voter.email, election_id, &address)
            .await?;
        info!("Opened voting session for {address} in election {election_id}");

        let mut committed = Committed::new(SessionInfo {
            session_token: session.session_id,
            public_address: session.public_address,
            next_nonce: session.next_nonce,
            expires_in_seconds: self.sessions.ttl().num_seconds(),
        });
        if let Err(err) = self
            .storage
            .mark_voter_authenticated(&voter.pesel, election_id)
            .await
        {
            committed.record(AdvisoryFailure::MarkAuthenticated {
                election_id,
                reason: err.to_string(),
            });
        }
        Ok(committed)
    }
}
