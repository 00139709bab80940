use std::sync::Arc;

use chrono::Utc;
use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio, Orbit, Rocket,
};

use crate::config::Config;
use crate::protocol::SessionStore;
use crate::storage::{Storage, StorageError};

/// Deletes expired challenges and sessions.
#[derive(Clone)]
pub struct Sweeper {
    storage: Arc<dyn Storage>,
    sessions: SessionStore,
}

impl Sweeper {
    pub fn new(storage: Arc<dyn Storage>, sessions: SessionStore) -> Self {
        Self { storage, sessions }
    }

    /// Run one sweep. Returns the number of challenges and sessions deleted.
    pub async fn sweep(&self) -> Result<(u64, u64), StorageError> {
        let challenges = self.storage.purge_expired_challenges(Utc::now()).await?;
        let sessions = self.sessions.purge_expired().await?;
        Ok((challenges, sessions))
    }
}

/// A fairing that runs the `Sweeper` in managed state periodically once the
/// server has launched.
pub struct SweeperFairing;

#[rocket::async_trait]
impl Fairing for SweeperFairing {
    fn info(&self) -> Info {
        Info {
            name: "Sweeper",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let (Some(config), Some(sweeper)) = (rocket.state::<Config>(), rocket.state::<Sweeper>())
        else {
            error!("Sweeper not started: config or sweeper missing from managed state");
            return;
        };
        let Some(period) = config.purge_interval() else {
            info!("Periodic sweeping disabled");
            return;
        };

        let sweeper = sweeper.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match sweeper.sweep().await {
                    Ok((0, 0)) => {}
                    Ok((challenges, sessions)) => {
                        debug!("Swept {challenges} expired challenges and {sessions} expired sessions")
                    }
                    Err(e) => warn!("Sweep failed: {e}"),
                }
            }
        });
        info!("Sweeping expired challenges and sessions every {}s", period.as_secs());
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::{challenge::Challenge, session::VotingSession};
    use crate::storage::MemoryStorage;

    #[rocket::async_test]
    async fn sweeps_only_expired_records() {
        let storage = MemoryStorage::new();
        let shared: Arc<dyn Storage> = Arc::new(storage.clone());
        let sweeper = Sweeper::new(
            shared.clone(),
            SessionStore::new(shared, Duration::hours(1)),
        );

        storage.insert_challenge(Challenge::new("0xaaa", Utc::now() - Duration::seconds(5)));
        storage.insert_challenge(Challenge::new("0xbbb", Utc::now() + Duration::minutes(5)));
        let mut stale = VotingSession::new("90010112345", "a@b.c", 1, "0xaaa");
        stale.created_at = Utc::now() - Duration::hours(3);
        storage.insert_session_directly(stale.clone());
        let fresh = VotingSession::new("85050554321", "d@e.f", 1, "0xbbb");
        storage.insert_session_directly(fresh.clone());

        assert_eq!(sweeper.sweep().await.unwrap(), (1, 1));
        assert!(storage.challenge("0xaaa").is_none());
        assert!(storage.challenge("0xbbb").is_some());
        assert!(storage.session(&stale.session_id).is_none());
        assert!(storage.session(&fresh.session_id).is_some());

        assert_eq!(sweeper.sweep().await.unwrap(), (0, 0));
    }
}
