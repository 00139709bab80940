use std::ops::Deref;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, FindOptions, IndexOptions, ReplaceOptions, ReturnDocument},
    Collection, Database, IndexModel,
};
use rocket::futures::TryStreamExt;

use crate::model::{
    challenge::Challenge,
    election::{Election, ElectionFilter, ElectionId, ElectionStatus},
    session::VotingSession,
    voter::Voter,
};

use super::{Storage, StorageError};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl MongoCollection for Challenge {
    const NAME: &'static str = "challenges";
}

impl MongoCollection for VotingSession {
    const NAME: &'static str = "sessions";
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for Voter {
    const NAME: &'static str = "voters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    // Voter collection: one registration per person per election.
    let voter_index = IndexModel::builder()
        .keys(doc! {"pesel": 1, "election_id": 1})
        .options(IndexOptions::builder().unique(true).build())
        .build();
    Coll::<Voter>::from_db(db)
        .create_index(voter_index, None)
        .await?;

    // Challenge collection: let the server expire stale challenges too.
    let challenge_index = IndexModel::builder()
        .keys(doc! {"expire_at": 1})
        .options(
            IndexOptions::builder()
                .expire_after(StdDuration::ZERO)
                .build(),
        )
        .build();
    Coll::<Challenge>::from_db(db)
        .create_index(challenge_index, None)
        .await?;

    // Session collection.
    let session_index = IndexModel::builder()
        .keys(doc! {"election_id": 1, "created_at": 1})
        .build();
    Coll::<VotingSession>::from_db(db)
        .create_index(session_index, None)
        .await?;

    Ok(())
}

/// Production storage on MongoDB.
pub struct MongoStorage {
    challenges: Coll<Challenge>,
    sessions: Coll<VotingSession>,
    elections: Coll<Election>,
    voters: Coll<Voter>,
}

impl MongoStorage {
    pub fn new(db: &Database) -> Self {
        Self {
            challenges: Coll::from_db(db),
            sessions: Coll::from_db(db),
            elections: Coll::from_db(db),
            voters: Coll::from_db(db),
        }
    }
}

#[rocket::async_trait]
impl Storage for MongoStorage {
    async fn upsert_challenge(&self, challenge: &Challenge) -> Result<(), StorageError> {
        let upsert = ReplaceOptions::builder().upsert(true).build();
        self.challenges
            .replace_one(doc! {"_id": challenge.address.as_str()}, challenge, upsert)
            .await?;
        Ok(())
    }

    async fn find_challenge(&self, address: &str) -> Result<Option<Challenge>, StorageError> {
        Ok(self.challenges.find_one(doc! {"_id": address}, None).await?)
    }

    async fn delete_challenge(&self, address: &str, nonce: &str) -> Result<bool, StorageError> {
        let result = self
            .challenges
            .delete_one(doc! {"_id": address, "nonce": nonce}, None)
            .await?;
        Ok(result.deleted_count == 1)
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let filter = doc! {"expire_at": {"$lt": BsonDateTime::from_chrono(now)}};
        Ok(self.challenges.delete_many(filter, None).await?.deleted_count)
    }

    async fn insert_session(&self, session: &VotingSession) -> Result<(), StorageError> {
        self.sessions.insert_one(session, None).await?;
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &str,
        election_id: ElectionId,
    ) -> Result<Option<VotingSession>, StorageError> {
        let filter = doc! {
            "_id": session_id,
            "election_id": election_id,
            "is_verified": true,
        };
        Ok(self.sessions.find_one(filter, None).await?)
    }

    async fn advance_session_nonce(
        &self,
        session_id: &str,
        expected: u64,
    ) -> Result<Option<VotingSession>, StorageError> {
        // Nonces start at 1 and grow by one per vote, so never approach `i64::MAX`.
        let expected = expected as i64;
        let filter = doc! {
            "_id": session_id,
            "next_nonce": expected,
        };
        let update = doc! {
            "$inc": {"next_nonce": 1_i64},
            "$set": {"has_voted": true},
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .sessions
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn purge_sessions_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let filter = doc! {"created_at": {"$lt": BsonDateTime::from_chrono(cutoff)}};
        Ok(self.sessions.delete_many(filter, None).await?.deleted_count)
    }

    async fn find_election(&self, id: ElectionId) -> Result<Option<Election>, StorageError> {
        Ok(self.elections.find_one(doc! {"_id": id}, None).await?)
    }

    async fn list_elections(
        &self,
        filter: &ElectionFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Election>, StorageError> {
        let options = FindOptions::builder()
            .sort(doc! {"start_time": -1})
            .build();
        let elections = self
            .elections
            .find(election_filter_document(filter, now), options)
            .await?
            .try_collect()
            .await?;
        Ok(elections)
    }

    async fn find_voter_by_credentials(
        &self,
        pesel: &str,
        election_id: ElectionId,
        verification_code: &str,
    ) -> Result<Option<Voter>, StorageError> {
        let filter = doc! {
            "pesel": pesel,
            "election_id": election_id,
            "verification_code": verification_code,
        };
        Ok(self.voters.find_one(filter, None).await?)
    }

    async fn find_voter(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<Option<Voter>, StorageError> {
        let filter = doc! {"pesel": pesel, "election_id": election_id};
        Ok(self.voters.find_one(filter, None).await?)
    }

    async fn mark_voter_authenticated(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<(), StorageError> {
        self.voters
            .update_one(
                doc! {"pesel": pesel, "election_id": election_id},
                doc! {"$set": {"is_authenticated": true}},
                None,
            )
            .await?;
        Ok(())
    }

    async fn mark_voter_voted(
        &self,
        pesel: &str,
        election_id: ElectionId,
    ) -> Result<(), StorageError> {
        self.voters
            .update_one(
                doc! {"pesel": pesel, "election_id": election_id},
                doc! {"$set": {"has_voted": true}},
                None,
            )
            .await?;
        Ok(())
    }
}

/// Translate an [`ElectionFilter`] into a query with the same semantics as
/// [`ElectionFilter::matches`].
fn election_filter_document(filter: &ElectionFilter, now: DateTime<Utc>) -> Document {
    let now = BsonDateTime::from_chrono(now);
    let mut clauses = Vec::new();
    match filter.status {
        Some(ElectionStatus::Active) => {
            clauses.push(doc! {"start_time": {"$lte": now}});
            clauses.push(doc! {"end_time": {"$gte": now}});
        }
        Some(ElectionStatus::Archive) => clauses.push(doc! {"end_time": {"$lt": now}}),
        Some(ElectionStatus::Upcoming) => clauses.push(doc! {"start_time": {"$gt": now}}),
        None => {}
    }
    if let Some(from) = filter.starts_from {
        clauses.push(doc! {"start_time": {"$gte": BsonDateTime::from_chrono(from)}});
    }
    if let Some(until) = filter.starts_until {
        clauses.push(doc! {"start_time": {"$lte": BsonDateTime::from_chrono(until)}});
    }

    if clauses.is_empty() {
        Document::new()
    } else {
        doc! {"$and": clauses}
    }
}
