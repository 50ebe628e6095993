//! The signed-in user's membership: access status, payments, cancellation.

use crate::middleware::Session;
use crate::services::{account, cancellation};
use crate::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;

pub async fn access_status(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<account::AccessReport>, AppError> {
    let report =
        account::get_access_status(state.repository.as_ref(), &session, Utc::now()).await?;
    Ok(Json(report))
}

pub async fn list_payments(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    let payments = account::list_payments(state.repository.as_ref(), &session).await?;
    Ok(Json(json!({ "success": true, "payments": payments })))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>, AppError> {
    let result = cancellation::cancel_subscription(
        state.repository.as_ref(),
        state.gateway.as_ref(),
        &session,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "status": result.status,
        "message": result.message,
    })))
}
