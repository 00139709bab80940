use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::signature::SignatureError;
use crate::storage::StorageError;

/// Why a challenge or verification was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),
    #[error("No pending challenge for this address")]
    ChallengeNotFound,
    #[error("Challenge has expired")]
    ChallengeExpired,
    #[error("Signature does not match the claimed address")]
    BadSignature,
    #[error("Invalid voter credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why a vote was not relayed.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),
    #[error("Invalid session for this election")]
    InvalidSession,
    #[error("Session has expired")]
    SessionExpired,
    #[error("Election not found")]
    ElectionNotFound,
    #[error("Election is not active")]
    ElectionNotActive,
    #[error("Voter not found")]
    VoterNotFound,
    #[error("Voter has already voted")]
    AlreadyVotedLocal,
    #[error("Signature does not match the session address")]
    BadSignature,
    #[error("A vote has already been recorded on the ledger for this voter")]
    AlreadyVotedOnChain,
    #[error("Another vote is in progress for this session")]
    ConcurrentVoteConflict,
    #[error("Could not relay vote: {0}")]
    RelayFailed(LedgerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Why results could not be produced.
#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("Election not found")]
    ElectionNotFound,
    #[error("Election has not finished yet")]
    ElectionNotFinished,
    #[error("Could not query the ledger: {0}")]
    LedgerQueryFailed(LedgerError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SignatureError> for AuthError {
    fn from(err: SignatureError) -> Self {
        debug!("Rejected signature: {err}");
        Self::BadSignature
    }
}

impl From<SignatureError> for VoteError {
    fn from(err: SignatureError) -> Self {
        debug!("Rejected signature: {err}");
        Self::BadSignature
    }
}

/// The trimmed value of a text field, or `None` if it is absent or blank.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Comma-separated names of the fields flagged as missing.
pub(crate) fn missing_names(fields: &[(&str, bool)]) -> String {
    fields
        .iter()
        .filter(|(_, missing)| *missing)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}
