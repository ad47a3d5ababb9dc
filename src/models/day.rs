use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One calendar day of a trip, stored as a single document in the trip
/// store. The `order` field is the persisted rank: the store keys its
/// documents by id and guarantees no sequence, so display order has to
/// survive in the document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub id: String,
    pub trip_id: String,
    pub date: NaiveDate,
    pub title: String,
    pub description: Option<String>,
    pub order: i64,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl ItineraryDay {
    pub fn new(
        trip_id: impl Into<String>,
        date: NaiveDate,
        title: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            trip_id: trip_id.into(),
            date,
            title: title.into(),
            description: None,
            order,
            activities: Vec::new(),
        }
    }

    pub fn description_display(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn date_display(&self) -> String {
        self.date.format("%d.%m.%Y").to_string()
    }
}

/// A planned event within a day. Its position in the day's activity
/// vector IS its order; there is no separate rank field, so edits and
/// reorders always replace the whole vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub cost: Option<f64>,
    pub category: Option<String>,
}

impl Activity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            location: None,
            start_time: None,
            end_time: None,
            cost: None,
            category: None,
        }
    }

    pub fn cost_or_zero(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }

    pub fn location_display(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    pub fn time_display(&self) -> String {
        match (self.start_time.as_deref(), self.end_time.as_deref()) {
            (Some(start), Some(end)) => format!("{start} – {end}"),
            (Some(start), None) => start.to_string(),
            (None, Some(end)) => format!("bis {end}"),
            (None, None) => String::new(),
        }
    }
}
