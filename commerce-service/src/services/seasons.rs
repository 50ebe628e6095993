//! Season (batch) lifecycle and the plan catalog.

use crate::middleware::{authorize, Capability, Session};
use crate::models::{
    parse_date_input, Batch, FieldUpdate, Plan, PlanInput, SeasonUpdate,
};
use crate::services::repository::{BatchDeletion, CommerceRepository, PlanRemoval};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

pub const SEASON_ENDED: &str = "This season has ended. New subscriptions are no longer accepted.";
pub const REGISTRATION_CLOSED: &str = "Registration for this season is closed.";
pub const NO_ACTIVE_SEASON: &str = "No active season found. Please launch a season first.";
pub const ARCHIVE_INSTEAD: &str =
    "Cannot delete: Users have purchased plans in this season. Please archive it instead.";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSeasonRequest {
    #[serde(alias = "name")]
    #[validate(length(min = 2, message = "Season name must be at least 2 characters"))]
    pub season_name: String,
    #[serde(default)]
    pub registration_close_date: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub plans: Vec<PlanInput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaunchedSeason {
    pub batch: Batch,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSeasonRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Empty string clears the close date.
    #[serde(default)]
    pub registration_close_date: Option<String>,
}

impl UpdateSeasonRequest {
    fn into_update(self) -> Result<SeasonUpdate, AppError> {
        let name = match self.name.map(|n| n.trim().to_string()) {
            Some(n) if n.chars().count() < 2 => {
                let mut errors = ValidationErrors::new();
                let mut err = ValidationError::new("length");
                err.message = Some("Season name must be at least 2 characters".into());
                errors.add("name", err);
                return Err(AppError::ValidationError(errors));
            }
            other => other,
        };

        let registration_close_date = match self.registration_close_date.as_deref().map(str::trim)
        {
            None => FieldUpdate::Keep,
            Some("") => FieldUpdate::Clear,
            Some(value) => FieldUpdate::Set(parse_date_input(value)?),
        };

        Ok(SeasonUpdate {
            name,
            registration_close_date,
        })
    }
}

/// Public pricing page: the ACTIVE season and what it sells.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub batch: Option<Batch>,
    pub plans: Vec<Plan>,
}

fn optional_date(value: Option<&str>) -> Result<Option<DateTime<Utc>>, AppError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date_input(v).map(Some),
    }
}

/// New orders and plans need an ACTIVE season that is still taking registrations.
pub fn ensure_season_open(batch: Option<&Batch>, now: DateTime<Utc>) -> Result<&Batch, AppError> {
    let batch = batch
        .filter(|b| b.is_active())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(SEASON_ENDED)))?;

    if !batch.registration_open_at(now) {
        return Err(AppError::BadRequest(anyhow::anyhow!(REGISTRATION_CLOSED)));
    }

    Ok(batch)
}

/// Archive the current season and open a new one with its plans, atomically.
pub async fn launch_season(
    repo: &dyn CommerceRepository,
    session: &Session,
    request: LaunchSeasonRequest,
    now: DateTime<Utc>,
) -> Result<LaunchedSeason, AppError> {
    let admin_id = authorize(session, Capability::ManageCatalog)?;

    if request.plans.is_empty() {
        let mut errors = ValidationErrors::new();
        let mut err = ValidationError::new("length");
        err.message = Some("At least one plan is required".into());
        errors.add("plans", err);
        return Err(AppError::ValidationError(errors));
    }
    request.validate()?;

    let close_date = optional_date(request.registration_close_date.as_deref())?;
    let plans: Vec<_> = request.plans.iter().map(PlanInput::normalize).collect();
    let name = request.season_name.trim();

    let (batch, plans) = repo
        .launch_season(name, close_date, &plans, now)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "Failed to launch season. Transaction rolled back.")
        })?;

    tracing::info!(
        admin_id = %admin_id,
        batch_id = %batch.batch_id,
        plan_count = plans.len(),
        "Season launched"
    );

    Ok(LaunchedSeason { batch, plans })
}

pub async fn update_season(
    repo: &dyn CommerceRepository,
    session: &Session,
    batch_id: Uuid,
    request: UpdateSeasonRequest,
) -> Result<Batch, AppError> {
    authorize(session, Capability::ManageCatalog)?;
    let update = request.into_update()?;

    let batch = if update.is_empty() {
        repo.get_batch(batch_id).await?
    } else {
        repo.update_batch(batch_id, &update).await?
    };

    batch.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Season not found")))
}

/// Hard delete, refused once any plan of the season has been purchased.
pub async fn delete_batch(
    repo: &dyn CommerceRepository,
    session: &Session,
    batch_id: Uuid,
) -> Result<&'static str, AppError> {
    authorize(session, Capability::ManageCatalog)?;

    match repo.delete_batch(batch_id).await? {
        BatchDeletion::Deleted => {
            tracing::info!(batch_id = %batch_id, "Season deleted");
            Ok("Season deleted permanently.")
        }
        BatchDeletion::NotFound => Err(AppError::NotFound(anyhow::anyhow!("Season not found"))),
        BatchDeletion::HasSubscriptions => {
            tracing::warn!(batch_id = %batch_id, "Season delete refused, plans have sales");
            Err(AppError::IntegrityViolation(anyhow::anyhow!(ARCHIVE_INSTEAD)))
        }
    }
}

/// Add a plan to the ACTIVE, open season.
pub async fn create_plan(
    repo: &dyn CommerceRepository,
    session: &Session,
    input: PlanInput,
    now: DateTime<Utc>,
) -> Result<Plan, AppError> {
    authorize(session, Capability::ManageCatalog)?;
    input.validate()?;

    let active = repo
        .active_batch()
        .await?
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(NO_ACTIVE_SEASON)))?;
    ensure_season_open(Some(&active), now)?;

    let plan = repo.create_plan(active.batch_id, &input.normalize()).await?;
    tracing::info!(plan_id = %plan.plan_id, batch_id = %active.batch_id, "Plan created");
    Ok(plan)
}

/// Replace a plan's editable fields.
pub async fn update_plan(
    repo: &dyn CommerceRepository,
    session: &Session,
    plan_id: Uuid,
    input: PlanInput,
) -> Result<Plan, AppError> {
    authorize(session, Capability::ManageCatalog)?;
    input.validate()?;

    repo.update_plan(plan_id, &input.normalize())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))
}

/// Delete an unsold plan; hide one that has sales.
pub async fn delete_or_archive_plan(
    repo: &dyn CommerceRepository,
    session: &Session,
    plan_id: Uuid,
) -> Result<&'static str, AppError> {
    authorize(session, Capability::ManageCatalog)?;

    match repo.delete_or_archive_plan(plan_id).await? {
        PlanRemoval::Deleted => Ok("Plan deleted permanently"),
        PlanRemoval::Archived => {
            tracing::info!(plan_id = %plan_id, "Plan archived instead of deleted");
            Ok("Plan archived (sales exist)")
        }
        PlanRemoval::NotFound => Err(AppError::NotFound(anyhow::anyhow!("Plan not found"))),
    }
}

/// Visible plans of the ACTIVE season. Admins also see archived plans.
pub async fn list_plans(
    repo: &dyn CommerceRepository,
    session: &Session,
) -> Result<Catalog, AppError> {
    let Some(batch) = repo.active_batch().await? else {
        return Ok(Catalog {
            batch: None,
            plans: Vec::new(),
        });
    };

    let mut plans = repo.list_plans(batch.batch_id).await?;
    if !session.is_admin() {
        plans.retain(|p| p.is_active);
    }

    Ok(Catalog {
        batch: Some(batch),
        plans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch(status: &str, close: Option<DateTime<Utc>>) -> Batch {
        let now = Utc::now();
        Batch {
            batch_id: Uuid::new_v4(),
            name: "Season 4".to_string(),
            status: status.to_string(),
            start_date: now,
            registration_close_date: close,
            end_date: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn open_season_passes() {
        let now = Utc::now();
        let b = batch("ACTIVE", Some(now + Duration::days(3)));
        assert!(ensure_season_open(Some(&b), now).is_ok());
    }

    #[test]
    fn archived_or_missing_season_has_ended() {
        let now = Utc::now();
        for b in [None, Some(batch("ARCHIVED", None))] {
            match ensure_season_open(b.as_ref(), now) {
                Err(AppError::BadRequest(e)) => assert_eq!(e.to_string(), SEASON_ENDED),
                other => panic!("expected season ended, got {:?}", other),
            }
        }
    }

    #[test]
    fn past_close_date_is_closed() {
        let now = Utc::now();
        let b = batch("ACTIVE", Some(now - Duration::hours(1)));
        match ensure_season_open(Some(&b), now) {
            Err(AppError::BadRequest(e)) => assert_eq!(e.to_string(), REGISTRATION_CLOSED),
            other => panic!("expected closed, got {:?}", other),
        }
    }

    #[test]
    fn empty_close_date_clears() {
        let update = UpdateSeasonRequest {
            name: None,
            registration_close_date: Some("  ".to_string()),
        }
        .into_update()
        .unwrap();
        assert_eq!(update.registration_close_date, FieldUpdate::Clear);
        assert!(update.name.is_none());
    }

    #[test]
    fn short_season_name_is_rejected() {
        let result = UpdateSeasonRequest {
            name: Some(" x ".to_string()),
            registration_close_date: None,
        }
        .into_update();
        assert!(matches!(result, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn launch_request_accepts_console_payload() {
        let request: LaunchSeasonRequest = serde_json::from_value(serde_json::json!({
            "seasonName": "Season 5",
            "registrationCloseDate": "2026-12-31",
            "plans": [
                { "title": "Explorer", "price": 4999 },
                { "title": "Voyager", "price": 12000, "allowInstallments": true, "installments": 3 }
            ]
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert_eq!(request.plans.len(), 2);
    }
}
