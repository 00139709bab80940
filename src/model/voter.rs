use serde::{Deserialize, Serialize};

use crate::model::election::ElectionId;

/// A voter registered for one election, as bulk-imported by the election
/// administrators. We only ever flip the two flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    /// National identification number.
    pub pesel: String,
    pub election_id: ElectionId,
    /// Code distributed to the voter out-of-band; must match verbatim.
    pub verification_code: String,
    pub email: String,
    /// Has the voter ever completed verification?
    #[serde(default)]
    pub is_authenticated: bool,
    /// Advisory only: the ledger is the authority on whether a vote was cast.
    #[serde(default)]
    pub has_voted: bool,
}
