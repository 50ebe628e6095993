//! Self-service cancellation inside the refund window.

use crate::middleware::{authorize, Capability, Session};
use crate::models::{PaymentStatus, SubscriptionStatus};
use crate::services::metrics::record_cancellation;
use crate::services::razorpay::{PaymentGateway, RefundNotes, RefundRequest, RefundStatus};
use crate::services::repository::{CancellationSettlement, CommerceRepository};
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;

pub const CANCELLATION_WINDOW_DAYS: i64 = 7;
pub const REFUND_REASON: &str = "User requested cancellation within 7 days";
const DAY_MS: f64 = 86_400_000.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationResult {
    pub status: SubscriptionStatus,
    pub message: String,
}

/// Whole days between two instants, rounded half away from zero.
pub fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> i64 {
    ((a - b).num_milliseconds().abs() as f64 / DAY_MS).round() as i64
}

pub async fn cancel_subscription(
    repo: &dyn CommerceRepository,
    gateway: &dyn PaymentGateway,
    session: &Session,
    now: DateTime<Utc>,
) -> Result<CancellationResult, AppError> {
    let user_id = authorize(session, Capability::Purchase)?;

    let subscription = repo
        .find_active_subscription(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No active subscription found.")))?;

    let days_active = days_between(now, subscription.start_date);
    if days_active > CANCELLATION_WINDOW_DAYS {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Cancellation period expired. You can only cancel within the first {} days. It has been {} days.",
            CANCELLATION_WINDOW_DAYS,
            days_active
        )));
    }

    let last_payment = repo
        .latest_captured_payment(user_id)
        .await?
        .and_then(|p| p.razorpay_payment_id.clone().map(|rp| (p, rp)));

    let Some((payment, razorpay_payment_id)) = last_payment else {
        repo.settle_cancellation(&CancellationSettlement {
            subscription_id: subscription.subscription_id,
            subscription_status: SubscriptionStatus::Canceled,
            ended_at: now,
            payment: None,
        })
        .await?;
        record_cancellation(SubscriptionStatus::Canceled.as_str());
        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.subscription_id,
            "Subscription canceled without refund"
        );
        return Ok(CancellationResult {
            status: SubscriptionStatus::Canceled,
            message: "Subscription canceled (No payment found to refund).".to_string(),
        });
    };

    let refund = gateway
        .refund_payment(
            &razorpay_payment_id,
            &RefundRequest {
                speed: "normal".to_string(),
                notes: RefundNotes {
                    reason: REFUND_REASON.to_string(),
                    subscription_id: subscription.subscription_id.to_string(),
                },
            },
        )
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                user_id = %user_id,
                payment_id = %razorpay_payment_id,
                "Refund request failed"
            );
            AppError::BadGateway(
                e.description()
                    .unwrap_or("Failed to process refund with payment gateway.")
                    .to_string(),
            )
        })?;

    let refund_status = refund.status();
    let (subscription_status, payment_status) = match refund_status {
        RefundStatus::Processed => (SubscriptionStatus::Refunded, Some(PaymentStatus::Refunded)),
        RefundStatus::Pending => (
            SubscriptionStatus::RefundProcessing,
            Some(PaymentStatus::RefundPending),
        ),
        RefundStatus::Failed => (SubscriptionStatus::Canceled, None),
    };

    repo.settle_cancellation(&CancellationSettlement {
        subscription_id: subscription.subscription_id,
        subscription_status,
        ended_at: now,
        payment: payment_status.map(|s| (payment.payment_id, s)),
    })
    .await?;

    record_cancellation(subscription_status.as_str());
    tracing::info!(
        user_id = %user_id,
        subscription_id = %subscription.subscription_id,
        refund_id = %refund.id,
        status = subscription_status.as_str(),
        "Subscription canceled"
    );

    let message = if refund_status == RefundStatus::Processed {
        "Success! Refund initiated and processed instantly."
    } else {
        "Cancellation successful. Refund is processing (5-7 days)."
    };

    Ok(CancellationResult {
        status: subscription_status,
        message: message.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn days_round_to_nearest() {
        let now = Utc::now();
        assert_eq!(days_between(now, now - Duration::hours(36)), 2);
        assert_eq!(days_between(now, now - Duration::hours(35)), 1);
        assert_eq!(days_between(now - Duration::days(8), now), 8);
    }
}
