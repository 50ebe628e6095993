//! Razorpay checkout: order creation, callback verification and webhooks.

use crate::middleware::Session;
use crate::services::ledger::{self, VerifyRequest};
use crate::services::orders::{self, OrderRequest};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use service_core::error::AppError;

pub const RAZORPAY_SIGNATURE_HEADER: &str = "X-Razorpay-Signature";

pub async fn create_order(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    tracing::info!(
        plan_id = %payload.plan_id,
        payment_mode = payload.payment_mode.as_str(),
        "Creating order"
    );

    let order = orders::create_order(
        state.repository.as_ref(),
        state.gateway.as_ref(),
        state.throttle.as_ref(),
        &session,
        payload,
        Utc::now(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": order })),
    ))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<Value>, AppError> {
    let verified = ledger::verify_payment(
        state.repository.as_ref(),
        &state.verifier,
        &session,
        payload,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "subscriptionId": verified.subscription_id,
    })))
}

/// Raw body is required: the signature covers the exact bytes sent.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(RAZORPAY_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    ledger::handle_webhook(
        state.repository.as_ref(),
        &state.verifier,
        signature,
        &body,
    )
    .await?;

    Ok(Json(json!({ "status": "ok" })))
}
