//! Voter authentication and vote relaying, independent of the HTTP layer.

mod auth;
mod challenge;
mod error;
mod session;
mod vote;

pub use auth::{AuthEngine, SessionInfo, VerifyRequest};
pub use challenge::ChallengeStore;
pub use error::{AuthError, ResultsError, VoteError};
pub use session::{SessionGuard, SessionLocks, SessionStore};
pub use vote::{ChoiceTally, VoteBallot, VoteReceipt, VoteRelay};
