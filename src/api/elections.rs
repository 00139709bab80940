use std::sync::Arc;

use chrono::Utc;
use rocket::{http::Status, serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::election::{ElectionDescription, ElectionFilter, ElectionId, ElectionSummary};
use crate::storage::Storage;

pub fn routes() -> Vec<Route> {
    routes![elections, election]
}

#[get("/elections?<status>&<date_from>&<date_to>")]
async fn elections(
    status: Option<&str>,
    date_from: Option<&str>,
    date_to: Option<&str>,
    storage: &State<Arc<dyn Storage>>,
) -> Result<Json<Vec<ElectionSummary>>> {
    let filter = ElectionFilter::from_query(status, date_from, date_to);
    let now = Utc::now();
    let elections = storage
        .list_elections(&filter, now)
        .await?
        .iter()
        .map(|election| ElectionSummary::new(election, now))
        .collect();
    Ok(Json(elections))
}

#[get("/elections/<election_id>")]
async fn election(
    election_id: ElectionId,
    storage: &State<Arc<dyn Storage>>,
) -> Result<Json<ElectionDescription>> {
    let election = storage
        .find_election(election_id)
        .await?
        .ok_or_else(|| Error::Status(Status::NotFound, format!("Election {election_id} not found")))?;
    Ok(Json(ElectionDescription::new(election, Utc::now())))
}

#[cfg(test)]
mod tests {
    use rocket::local::asynchronous::Client;

    use super::*;
    use crate::model::election::{Election, ElectionStatus};
    use crate::storage::MemoryStorage;

    async fn list(client: &Client, query: &str) -> Vec<ElectionSummary> {
        let uri = format!("/elections{query}");
        let response = client.get(uri.as_str()).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    #[backend_test]
    async fn list_with_filters(client: Client, storage: MemoryStorage) {
        storage.insert_election(Election::finished_example(1));
        storage.insert_election(Election::active_example(2));
        storage.insert_election(Election::upcoming_example(3));

        let all = list(&client, "").await;
        assert_eq!(all.iter().map(|e| e.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        assert_eq!(all[0].status, ElectionStatus::Upcoming);
        assert_eq!(all[1].status, ElectionStatus::Active);
        assert_eq!(all[2].status, ElectionStatus::Archive);

        let active = list(&client, "?status=Active").await;
        assert_eq!(active.iter().map(|e| e.id).collect::<Vec<_>>(), vec![2]);

        // Unknown status and bad dates are ignored.
        assert_eq!(list(&client, "?status=all&date_from=yesterday").await.len(), 3);

        let far_future = list(&client, "?date_from=2999-01-01").await;
        assert!(far_future.is_empty());
    }

    #[backend_test]
    async fn single_election(client: Client, storage: MemoryStorage) {
        storage.insert_election(Election::active_example(4));

        let response = client.get(uri!(election(4))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let description = response.into_json::<ElectionDescription>().await.unwrap();
        assert_eq!(description.summary.id, 4);
        assert_eq!(description.summary.status, ElectionStatus::Active);
        assert_eq!(description.choices.len(), 3);

        let response = client.get(uri!(election(5))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }
}
