//! Read-only views of a user's membership.

use crate::middleware::{authorize, Capability, Session};
use crate::models::{Payment, SubscriptionStatus};
use crate::services::access::{evaluate_access, AccessDecision};
use crate::services::repository::CommerceRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub subscription_id: Uuid,
    pub plan_id: Uuid,
    pub plan_title: String,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub amount_paid: i64,
    pub total_amount: i64,
    pub installments_paid: i32,
    pub total_installments: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessReport {
    pub has_access: bool,
    #[serde(flatten)]
    pub decision: AccessDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionSummary>,
}

pub async fn get_access_status(
    repo: &dyn CommerceRepository,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<AccessReport, AppError> {
    let user_id = authorize(session, Capability::Purchase)?;

    let subscription = repo.find_active_subscription(user_id).await?;
    let plan = match &subscription {
        Some(sub) => repo.get_plan(sub.plan_id).await?,
        None => None,
    };

    let entitlement = subscription.as_ref().zip(plan.as_ref());
    let decision = evaluate_access(now, entitlement);

    let summary = entitlement.map(|(sub, plan)| SubscriptionSummary {
        subscription_id: sub.subscription_id,
        plan_id: plan.plan_id,
        plan_title: plan.title.clone(),
        status: sub.status(),
        start_date: sub.start_date,
        end_date: sub.end_date,
        amount_paid: sub.amount_paid,
        total_amount: sub.total_amount,
        installments_paid: sub.installments_paid,
        total_installments: plan.installment_count(),
    });

    tracing::debug!(user_id = %user_id, status = ?decision.status, "Access evaluated");

    Ok(AccessReport {
        has_access: decision.status.has_access(),
        decision,
        subscription: summary,
    })
}

/// Payment history, newest first.
pub async fn list_payments(
    repo: &dyn CommerceRepository,
    session: &Session,
) -> Result<Vec<Payment>, AppError> {
    let user_id = authorize(session, Capability::Purchase)?;
    repo.list_payments(user_id).await
}
