use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};

/// Namespace tag at the start of every challenge nonce, so a signed
/// challenge can never be mistaken for a signed vote.
pub const NONCE_PREFIX: &str = "evote:";

/// Number of random bytes in a nonce.
const NONCE_BYTES: usize = 16;

/// A pending proof-of-ownership challenge for one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Normalized address; there is at most one challenge per address.
    #[serde(rename = "_id")]
    pub address: String,
    /// The exact text the wallet must sign.
    pub nonce: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub expire_at: DateTime<Utc>,
}

impl Challenge {
    /// Create a challenge with a fresh random nonce.
    pub fn new(address: &str, expire_at: DateTime<Utc>) -> Self {
        let mut bytes = [0; NONCE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            address: normalize_address(address),
            nonce: format!("{NONCE_PREFIX}{}", HEXLOWER.encode(&bytes)),
            expire_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at < now
    }
}

/// Challenges are keyed case-insensitively.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}
