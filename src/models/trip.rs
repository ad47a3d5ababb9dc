use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub owner_uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_public: bool,
    pub budget: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        owner_uuid: impl Into<String>,
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_uuid: owner_uuid.into(),
            name: name.into(),
            description: None,
            start_date,
            end_date,
            is_public: false,
            budget: None,
            created_at: Utc::now(),
        }
    }

    pub fn description_display(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn date_range_display(&self) -> String {
        format!(
            "{} – {}",
            self.start_date.format("%d.%m.%Y"),
            self.end_date.format("%d.%m.%Y")
        )
    }
}
