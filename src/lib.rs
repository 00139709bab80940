#[macro_use]
extern crate rocket;

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, EngineFairing, LedgerFairing};
use crate::logging::LoggerFairing;
use crate::sweeper::SweeperFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod storage;
pub mod sweeper;

/// Assemble the server. Configuration is read, and the database and ledger
/// connected, when the rocket ignites.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(LedgerFairing)
        .attach(EngineFairing)
        .attach(SweeperFairing)
}

/// Assemble the server over the given backends instead of the configured ones.
#[cfg(test)]
pub(crate) fn rocket_for_backends(
    config: config::Config,
    storage: std::sync::Arc<dyn storage::Storage>,
    ledger: std::sync::Arc<dyn ledger::Ledger>,
) -> Rocket<Build> {
    let engines = config::Engines::new(&config, storage.clone(), ledger.clone());
    let rocket = rocket::build()
        .mount("/", api::routes())
        .register("/", api::catchers())
        .attach(LoggerFairing)
        .attach(SweeperFairing)
        .manage(config)
        .manage(storage)
        .manage(ledger);
    engines.manage(rocket)
}
