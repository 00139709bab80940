use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::protocol::{AuthError, ResultsError, VoteError};
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Results(#[from] ResultsError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Auth(err) => match err {
                AuthError::MissingFields(_) => Status::BadRequest,
                AuthError::ChallengeNotFound
                | AuthError::ChallengeExpired
                | AuthError::BadSignature
                | AuthError::InvalidCredentials => Status::Forbidden,
                AuthError::Storage(_) => Status::InternalServerError,
            },
            Self::Vote(err) => match err {
                VoteError::MissingFields(_) | VoteError::ElectionNotActive => Status::BadRequest,
                VoteError::SessionExpired => Status::Unauthorized,
                VoteError::InvalidSession | VoteError::BadSignature => Status::Forbidden,
                VoteError::ElectionNotFound | VoteError::VoterNotFound => Status::NotFound,
                VoteError::AlreadyVotedLocal
                | VoteError::AlreadyVotedOnChain
                | VoteError::ConcurrentVoteConflict => Status::Conflict,
                VoteError::RelayFailed(_) | VoteError::Storage(_) => Status::InternalServerError,
            },
            Self::Results(err) => match err {
                ResultsError::ElectionNotFound => Status::NotFound,
                ResultsError::ElectionNotFinished => Status::BadRequest,
                ResultsError::LedgerQueryFailed(_) | ResultsError::Storage(_) => {
                    Status::InternalServerError
                }
            },
            Self::Storage(_) => Status::InternalServerError,
            Self::Status(status, _) => *status,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.class() == StatusClass::ServerError {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).respond_to(req)
    }
}
