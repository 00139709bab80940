use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::election::ElectionId;
use crate::protocol::{ChoiceTally, VoteBallot, VoteReceipt, VoteRelay};

pub fn routes() -> Vec<Route> {
    routes![cast_vote, results]
}

#[post("/elections/<election_id>/vote", data = "<ballot>", format = "json")]
async fn cast_vote(
    election_id: ElectionId,
    ballot: Json<VoteBallot>,
    relay: &State<VoteRelay>,
) -> Result<Json<VoteReceipt>> {
    // Advisory failures have already been logged.
    let committed = relay.cast_vote(election_id, &ballot).await?;
    Ok(Json(committed.value))
}

#[get("/elections/<election_id>/results")]
async fn results(election_id: ElectionId, relay: &State<VoteRelay>) -> Result<Json<ElectionResults>> {
    let results = relay.results(election_id).await?;
    Ok(Json(ElectionResults { results }))
}

/// Final on-chain tallies for every choice in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub results: Vec<ChoiceTally>,
}
