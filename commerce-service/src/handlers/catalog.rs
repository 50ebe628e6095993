//! Season and plan administration, plus the public catalog.

use crate::middleware::Session;
use crate::models::PlanInput;
use crate::services::seasons::{self, LaunchSeasonRequest, UpdateSeasonRequest};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn list_plans(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    let catalog = seasons::list_plans(state.repository.as_ref(), &session).await?;
    Ok(Json(json!({
        "success": true,
        "batch": catalog.batch,
        "plans": catalog.plans,
    })))
}

pub async fn launch_season(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<LaunchSeasonRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let launched =
        seasons::launch_season(state.repository.as_ref(), &session, payload, Utc::now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "batch": launched.batch,
            "plans": launched.plans,
        })),
    ))
}

pub async fn update_season(
    State(state): State<AppState>,
    session: Session,
    Path(batch_id): Path<Uuid>,
    Json(payload): Json<UpdateSeasonRequest>,
) -> Result<Json<Value>, AppError> {
    let batch =
        seasons::update_season(state.repository.as_ref(), &session, batch_id, payload).await?;
    Ok(Json(json!({ "success": true, "batch": batch })))
}

pub async fn delete_season(
    State(state): State<AppState>,
    session: Session,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let message = seasons::delete_batch(state.repository.as_ref(), &session, batch_id).await?;
    Ok(Json(json!({ "success": true, "message": message })))
}

pub async fn create_plan(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<PlanInput>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let plan =
        seasons::create_plan(state.repository.as_ref(), &session, payload, Utc::now()).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "plan": plan })),
    ))
}

pub async fn update_plan(
    State(state): State<AppState>,
    session: Session,
    Path(plan_id): Path<Uuid>,
    Json(payload): Json<PlanInput>,
) -> Result<Json<Value>, AppError> {
    let plan = seasons::update_plan(state.repository.as_ref(), &session, plan_id, payload).await?;
    Ok(Json(json!({ "success": true, "plan": plan })))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    session: Session,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let message =
        seasons::delete_or_archive_plan(state.repository.as_ref(), &session, plan_id).await?;
    Ok(Json(json!({ "success": true, "message": message })))
}
