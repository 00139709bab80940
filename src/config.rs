use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use k256::ecdsa::SigningKey;
use mongodb::Client as MongoClient;
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;
use thiserror::Error;

use crate::ledger::{rpc::HttpTransport, EthLedger, FeeSchedule, Ledger, LedgerError};
use crate::model::signature::{decode_hex, Address, AddressParseError};
use crate::protocol::{AuthEngine, ChallengeStore, SessionStore, VoteRelay};
use crate::storage::{ensure_indexes_exist, MongoStorage, Storage};
use crate::sweeper::Sweeper;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_challenge_ttl")]
    challenge_ttl: u32,
    #[serde(default = "default_session_ttl")]
    session_ttl: u32,
    #[serde(default = "default_purge_interval")]
    purge_interval: u32,
    // secrets
    secret_salt: String,
}

fn default_challenge_ttl() -> u32 {
    600
}

fn default_session_ttl() -> u32 {
    3600
}

fn default_purge_interval() -> u32 {
    300
}

impl Config {
    /// Valid lifetime of an ownership challenge.
    pub fn challenge_ttl(&self) -> Duration {
        Duration::seconds(self.challenge_ttl.into())
    }

    /// Valid lifetime of a voting session.
    pub fn session_ttl(&self) -> Duration {
        Duration::seconds(self.session_ttl.into())
    }

    /// How often to sweep expired challenges and sessions; `None` if never.
    pub fn purge_interval(&self) -> Option<StdDuration> {
        (self.purge_interval > 0).then(|| StdDuration::from_secs(self.purge_interval.into()))
    }

    /// Salt mixed into every on-chain voter key.
    pub fn secret_salt(&self) -> &str {
        &self.secret_salt
    }
}

/// A fairing that loads the application config and puts it in managed state.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "evote".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places an `Arc<dyn Storage>` into
/// managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the required indexes exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to connect to database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        let storage: Arc<dyn Storage> = Arc::new(MongoStorage::new(&db));
        rocket = rocket.manage(storage);
        Ok(rocket)
    }
}

/// Configuration for the ledger node and the relayer account.
#[derive(Deserialize)]
pub struct LedgerConfig {
    // non-secrets
    rpc_url: String,
    contract_address: String,
    #[serde(default = "default_chain_id")]
    chain_id: u64,
    #[serde(default = "default_gas_limit")]
    gas_limit: u64,
    #[serde(default = "default_max_fee_per_gas")]
    max_fee_per_gas: u64,
    #[serde(default = "default_max_priority_fee_per_gas")]
    max_priority_fee_per_gas: u64,
    #[serde(default = "default_rpc_timeout")]
    rpc_timeout: u64,
    // secrets
    relayer_key: String,
}

fn default_chain_id() -> u64 {
    11_155_111
}

fn default_gas_limit() -> u64 {
    250_000
}

fn default_max_fee_per_gas() -> u64 {
    15_000_000_000
}

fn default_max_priority_fee_per_gas() -> u64 {
    1_500_000_000
}

fn default_rpc_timeout() -> u64 {
    20
}

/// Ways the ledger configuration can be unusable.
#[derive(Debug, Error)]
pub enum LedgerConfigError {
    #[error("Invalid contract address: {0}")]
    ContractAddress(#[from] AddressParseError),
    #[error("Invalid relayer key")]
    RelayerKey,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl LedgerConfig {
    /// Build a ledger client from this configuration. Does not contact the
    /// node.
    pub fn connect(&self) -> Result<EthLedger, LedgerConfigError> {
        let contract: Address = self.contract_address.parse()?;
        let relayer = decode_hex(self.relayer_key.trim())
            .and_then(|bytes| SigningKey::from_slice(&bytes).ok())
            .ok_or(LedgerConfigError::RelayerKey)?;
        let transport =
            HttpTransport::new(&self.rpc_url, StdDuration::from_secs(self.rpc_timeout))?;
        let fees = FeeSchedule {
            chain_id: self.chain_id,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
        };
        Ok(EthLedger::new(transport, contract, relayer, fees))
    }
}

/// A fairing that loads the ledger config and places an `Arc<dyn Ledger>`
/// into managed state.
pub struct LedgerFairing;

#[rocket::async_trait]
impl Fairing for LedgerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Ledger",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<LedgerConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load ledger config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        let ledger = match config.connect() {
            Ok(ledger) => ledger,
            Err(e) => {
                error!("Failed to set up ledger client: {e}");
                return Err(rocket);
            }
        };
        info!(
            "Relaying votes to {} from {}",
            config.contract_address,
            ledger.relayer_address()
        );

        // Manage the state.
        let ledger: Arc<dyn Ledger> = Arc::new(ledger);
        rocket = rocket.manage(ledger);
        Ok(rocket)
    }
}

/// Everything the request handlers need, built from the shared backends.
pub(crate) struct Engines {
    pub auth: AuthEngine,
    pub relay: VoteRelay,
    pub sweeper: Sweeper,
}

impl Engines {
    pub fn new(config: &Config, storage: Arc<dyn Storage>, ledger: Arc<dyn Ledger>) -> Self {
        let challenges = ChallengeStore::new(storage.clone(), config.challenge_ttl());
        let sessions = SessionStore::new(storage.clone(), config.session_ttl());
        Self {
            auth: AuthEngine::new(storage.clone(), challenges, sessions.clone()),
            relay: VoteRelay::new(
                storage.clone(),
                ledger,
                sessions.clone(),
                config.secret_salt(),
            ),
            sweeper: Sweeper::new(storage, sessions),
        }
    }

    pub fn manage(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket
            .manage(self.auth)
            .manage(self.relay)
            .manage(self.sweeper)
    }
}

/// A fairing that builds the protocol engines over the storage and ledger
/// in managed state.
/// This fairing depends on the config, database, and ledger fairings, and so
/// must be attached after them.
pub struct EngineFairing;

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Engines",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, storage, ledger) = match (
            rocket.state::<Config>(),
            rocket.state::<Arc<dyn Storage>>(),
            rocket.state::<Arc<dyn Ledger>>(),
        ) {
            (Some(config), Some(storage), Some(ledger)) => {
                (config.clone(), storage.clone(), ledger.clone())
            }
            _ => {
                error!("Config, database, and ledger must be available to build the engines");
                return Err(rocket);
            }
        };

        Ok(Engines::new(&config, storage, ledger).manage(rocket))
    }
}
