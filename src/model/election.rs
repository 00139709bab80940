use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{de, Deserialize, Deserializer, Serialize};

/// Our election IDs are integers.
pub type ElectionId = u32;
/// Our choice IDs are integers, unique within an election.
pub type ChoiceId = u32;

/// Deserialize an optional ID sent either as a number or as a numeric
/// string, as form-driven clients tend to. A blank string counts as absent.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match Option::<RawId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawId::Number(id)) => Ok(Some(id)),
        Some(RawId::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawId::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid ID `{text}`"))),
    }
}

/// An option voters can pick in an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// An election, as stored by the election-management collaborator.
/// We only ever read these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: ElectionId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Voting opens.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Election {
    /// Is voting open at `now`? Both ends of the window are inclusive.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    /// Have results become available at `now`?
    pub fn is_finished_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> ElectionStatus {
        if self.end_time < now {
            ElectionStatus::Archive
        } else if self.start_time > now {
            ElectionStatus::Upcoming
        } else {
            ElectionStatus::Active
        }
    }
}

/// Where an election is in its lifecycle, relative to the current time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    Upcoming,
    Active,
    Archive,
}

impl ElectionStatus {
    /// Parse a status filter. `"all"` and anything unrecognised mean no filter.
    pub fn parse_filter(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "upcoming" => Some(Self::Upcoming),
            "active" => Some(Self::Active),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }
}

/// Filter for listing elections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectionFilter {
    pub status: Option<ElectionStatus>,
    /// Earliest start time, inclusive.
    pub starts_from: Option<DateTime<Utc>>,
    /// Latest start time, inclusive.
    pub starts_until: Option<DateTime<Utc>>,
}

impl ElectionFilter {
    /// Build a filter from raw query parameters. Dates are `YYYY-MM-DD`;
    /// unparseable values are ignored rather than rejected.
    pub fn from_query(status: Option<&str>, date_from: Option<&str>, date_to: Option<&str>) -> Self {
        let parse_date = |date: Option<&str>| {
            date.and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        };
        Self {
            status: status.and_then(ElectionStatus::parse_filter),
            starts_from: parse_date(date_from)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| Utc.from_utc_datetime(&d)),
            starts_until: parse_date(date_to)
                .and_then(|d| d.and_hms_opt(23, 59, 59))
                .map(|d| Utc.from_utc_datetime(&d)),
        }
    }

    pub fn matches(&self, election: &Election, now: DateTime<Utc>) -> bool {
        if let Some(status) = self.status {
            if election.status_at(now) != status {
                return false;
            }
        }
        if let Some(from) = self.starts_from {
            if election.start_time < from {
                return false;
            }
        }
        if let Some(until) = self.starts_until {
            if election.start_time > until {
                return false;
            }
        }
        true
    }
}

/// Public view of an election's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ElectionId,
    pub name: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ElectionStatus,
}

impl ElectionSummary {
    pub fn new(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            name: election.name.clone(),
            description: election.description.clone(),
            start_time: election.start_time,
            end_time: election.end_time,
            status: election.status_at(now),
        }
    }
}

/// Public view of an election, including its choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    #[serde(flatten)]
    pub summary: ElectionSummary,
    pub choices: Vec<Choice>,
}

impl ElectionDescription {
    pub fn new(election: Election, now: DateTime<Utc>) -> Self {
        Self {
            summary: ElectionSummary::new(&election, now),
            choices: election.choices,
        }
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn window_is_inclusive() {
        let election = Election::active_example(1);
        assert!(election.is_active_at(election.start_time));
        assert!(election.is_active_at(election.end_time));
        assert!(!election.is_active_at(election.end_time + Duration::seconds(1)));
        assert!(!election.is_active_at(election.start_time - Duration::seconds(1)));

        assert!(!election.is_finished_at(election.end_time));
        assert!(election.is_finished_at(election.end_time + Duration::seconds(1)));
    }

    #[test]
    fn ids_accept_numeric_strings() {
        #[derive(Debug, Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "lenient_id")]
            id: Option<ElectionId>,
        }
        let parse = |text: &str| rocket::serde::json::from_str::<Body>(text).map(|b| b.id);

        assert_eq!(parse(r#"{"id": 7}"#).unwrap(), Some(7));
        assert_eq!(parse(r#"{"id": "7"}"#).unwrap(), Some(7));
        assert_eq!(parse(r#"{"id": " 12 "}"#).unwrap(), Some(12));
        assert_eq!(parse(r#"{"id": ""}"#).unwrap(), None);
        assert_eq!(parse(r#"{"id": null}"#).unwrap(), None);
        assert_eq!(parse("{}").unwrap(), None);
        parse(r#"{"id": "seven"}"#).unwrap_err();
        parse(r#"{"id": -1}"#).unwrap_err();
        parse(r#"{"id": [7]}"#).unwrap_err();
    }

    #[test]
    fn status() {
        let now = Utc::now();
        assert_eq!(Election::active_example(1).status_at(now), ElectionStatus::Active);
        assert_eq!(Election::finished_example(1).status_at(now), ElectionStatus::Archive);
        assert_eq!(Election::upcoming_example(1).status_at(now), ElectionStatus::Upcoming);
    }

    #[test]
    fn filter_from_query() {
        let filter = ElectionFilter::from_query(Some("ACTIVE"), Some("2024-05-01"), Some("garbage"));
        assert_eq!(filter.status, Some(ElectionStatus::Active));
        assert_eq!(
            filter.starts_from,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(filter.starts_until, None);

        let filter = ElectionFilter::from_query(Some("all"), None, Some("2024-05-31"));
        assert_eq!(filter.status, None);
        assert_eq!(
            filter.starts_until,
            Some(Utc.with_ymd_and_hms(2024, 5, 31, 23, 59, 59).unwrap())
        );
    }

    #[test]
    fn filter_matches() {
        let now = Utc::now();
        let active = Election::active_example(1);
        let finished = Election::finished_example(2);

        let by_status = ElectionFilter {
            status: Some(ElectionStatus::Archive),
            ..Default::default()
        };
        assert!(by_status.matches(&finished, now));
        assert!(!by_status.matches(&active, now));

        let by_date = ElectionFilter {
            starts_from: Some(now - Duration::hours(2)),
            ..Default::default()
        };
        assert!(by_date.matches(&active, now));
        assert!(!by_date.matches(&finished, now));

        assert!(ElectionFilter::default().matches(&active, now));
    }
}
