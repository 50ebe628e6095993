//! Checkout: price the next payment and open a Razorpay order for it.

use crate::middleware::{authorize, Capability, Session};
use crate::models::NewPayment;
use crate::services::metrics::record_order;
use crate::services::pricing::{quote, PaymentMode, PurchaseState};
use crate::services::razorpay::{CreateOrderRequest, OrderNotes, PaymentGateway};
use crate::services::repository::CommerceRepository;
use crate::services::seasons::ensure_season_open;
use crate::services::throttle::OrderThrottle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

pub const CURRENCY: &str = "INR";
pub const PLAN_SWITCH_BLOCKED: &str = "You already have an active membership. You cannot switch plans while your current subscription is active.";
pub const ALREADY_PAID: &str = "You have already fully paid for this plan.";
pub const ORDER_FAILED: &str = "Failed to initiate payment. Please try again.";

fn default_mode() -> PaymentMode {
    PaymentMode::Full
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub plan_id: Uuid,
    #[serde(default = "default_mode")]
    pub payment_mode: PaymentMode,
}

/// What the checkout widget needs to open the order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub installment_index: i32,
    pub key_id: String,
}

/// `rect_{first 10 chars of user id}_{epoch millis}`
fn receipt(user_id: &str, now: DateTime<Utc>) -> String {
    let prefix: String = user_id.chars().take(10).collect();
    format!("rect_{}_{}", prefix, now.timestamp_millis())
}

pub async fn create_order(
    repo: &dyn CommerceRepository,
    gateway: &dyn PaymentGateway,
    throttle: &dyn OrderThrottle,
    session: &Session,
    request: OrderRequest,
    now: DateTime<Utc>,
) -> Result<CheckoutOrder, AppError> {
    let user_id = authorize(session, Capability::Purchase)?;
    throttle.acquire(user_id).await?;

    let active = repo.find_active_subscription(user_id).await?;
    if let Some(ref sub) = active {
        if sub.plan_id != request.plan_id {
            return Err(AppError::Conflict(anyhow::anyhow!(PLAN_SWITCH_BLOCKED)));
        }
    }

    let plan = repo
        .get_plan(request.plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invalid Plan.")))?;

    let existing = match active {
        Some(sub) => Some(sub),
        None => repo.find_subscription(user_id, plan.plan_id).await?,
    };

    let state = PurchaseState::classify(existing.as_ref(), &plan);
    if state == PurchaseState::AlreadyComplete {
        return Err(AppError::Conflict(anyhow::anyhow!(ALREADY_PAID)));
    }
    if state == PurchaseState::NoPriorAttempt && !plan.is_active {
        return Err(AppError::NotFound(anyhow::anyhow!("Invalid Plan.")));
    }

    let batch = repo.get_batch(plan.batch_id).await?;
    ensure_season_open(batch.as_ref(), now)?;

    let priced = quote(&plan, request.payment_mode, state)
        .ok_or_else(|| AppError::Conflict(anyhow::anyhow!(ALREADY_PAID)))?;
    let effective_mode = if priced.installment_mode {
        PaymentMode::Installment
    } else {
        PaymentMode::Full
    };
    let mode_label = effective_mode.as_str();

    let order_request = CreateOrderRequest {
        amount: priced.amount,
        currency: CURRENCY.to_string(),
        receipt: receipt(user_id, now),
        notes: OrderNotes {
            plan_id: plan.plan_id.to_string(),
            user_id: user_id.to_string(),
            is_installment: priced.installment_mode.to_string(),
            payment_mode: request.payment_mode.as_str().to_string(),
            installment_index: priced.installment_index.to_string(),
        },
    };

    let order = gateway.create_order(&order_request).await.map_err(|e| {
        tracing::error!(
            error = %e,
            user_id = %user_id,
            plan_id = %plan.plan_id,
            "Order creation failed"
        );
        record_order(mode_label, "gateway_error");
        AppError::BadGateway(ORDER_FAILED.to_string())
    })?;

    repo.insert_payment(&NewPayment {
        user_id: user_id.to_string(),
        plan_id: plan.plan_id,
        razorpay_order_id: order.id.clone(),
        amount: priced.amount,
        payment_mode: effective_mode,
        installment_index: priced.installment_index,
    })
    .await?;

    record_order(mode_label, "created");
    tracing::info!(
        user_id = %user_id,
        plan_id = %plan.plan_id,
        order_id = %order.id,
        amount = priced.amount,
        installment_index = priced.installment_index,
        "Order created"
    );

    Ok(CheckoutOrder {
        id: order.id,
        amount: order.amount,
        currency: order.currency,
        description: priced.description,
        installment_index: priced.installment_index,
        key_id: gateway.key_id().to_string(),
    })
}
