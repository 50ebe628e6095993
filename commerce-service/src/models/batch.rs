//! Season (batch) model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;

/// Season lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Active,
    Archived,
    Draft,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "ACTIVE",
            BatchStatus::Archived => "ARCHIVED",
            BatchStatus::Draft => "DRAFT",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "ACTIVE" => BatchStatus::Active,
            "ARCHIVED" => BatchStatus::Archived,
            _ => BatchStatus::Draft,
        }
    }
}

/// A time-bounded sales period. At most one is ACTIVE.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_id: Uuid,
    pub name: String,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub registration_close_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Batch {
    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == BatchStatus::Active
    }

    /// Registration is open until the close date inclusive; no date means open.
    pub fn registration_open_at(&self, now: DateTime<Utc>) -> bool {
        match self.registration_close_date {
            Some(close) => now <= close,
            None => true,
        }
    }
}

/// Three-way update for nullable columns: leave, null out, or overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

/// Partial season edit.
#[derive(Debug, Clone, Default)]
pub struct SeasonUpdate {
    pub name: Option<String>,
    pub registration_close_date: FieldUpdate<DateTime<Utc>>,
}

impl SeasonUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.registration_close_date == FieldUpdate::Keep
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date_input(value: &str) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Invalid date: {}", value)))
}
