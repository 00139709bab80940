use rocket::{serde::json::Json, Route, State};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::{AuthEngine, SessionInfo, VerifyRequest};

pub fn routes() -> Vec<Route> {
    routes![challenge, verify]
}

#[post("/auth/challenge", data = "<request>", format = "json")]
async fn challenge(
    request: Json<ChallengeRequest>,
    auth: &State<AuthEngine>,
) -> Result<Json<ChallengeResponse>> {
    let nonce = auth.begin_challenge(request.address.as_deref()).await?;
    Ok(Json(ChallengeResponse { nonce }))
}

#[post("/auth/verify", data = "<request>", format = "json")]
async fn verify(request: Json<VerifyRequest>, auth: &State<AuthEngine>) -> Result<Json<SessionInfo>> {
    // Advisory failures have already been logged.
    let committed = auth.verify(&request).await?;
    Ok(Json(committed.value))
}

/// A request to prove ownership of a wallet address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    #[serde(default)]
    pub address: Option<String>,
}

/// The text the wallet must sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub nonce: String,
}
