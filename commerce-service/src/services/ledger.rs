//! Subscription ledger: checkout verification and Razorpay webhooks.
//!
//! Both paths verify an HMAC before touching state. Verification applies the
//! payment to the (user, plan) subscription in one transaction; webhooks are
//! at-least-once, so every write they make is idempotent.

use crate::middleware::{authorize, Capability, Session};
use crate::models::{PaymentStatus, SubscriptionStatus};
use crate::services::metrics::{record_capture, record_webhook};
use crate::services::razorpay::{SignatureVerifier, WebhookEvent};
use crate::services::repository::{CaptureOutcome, CommerceRepository, PaymentCapture};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

pub const REFUND_PROCESSED: &str = "refund.processed";
pub const REFUND_FAILED: &str = "refund.failed";
pub const PAYMENT_CAPTURED: &str = "payment.captured";

/// Checkout success callback, forwarded by the BFF.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(rename = "planId")]
    pub plan_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    pub subscription_id: Uuid,
    /// The payment had already been applied by an earlier call.
    pub duplicate: bool,
}

fn order_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Order not found"))
}

pub async fn verify_payment(
    repo: &dyn CommerceRepository,
    verifier: &SignatureVerifier,
    session: &Session,
    request: VerifyRequest,
    now: DateTime<Utc>,
) -> Result<VerifiedPayment, AppError> {
    let user_id = authorize(session, Capability::Purchase)?;

    if !verifier.verify_payment(
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    ) {
        tracing::warn!(
            security_event = true,
            user_id = %user_id,
            order_id = %request.razorpay_order_id,
            "Payment signature mismatch"
        );
        record_capture("verify", "invalid_signature");
        return Err(AppError::SignatureMismatch(anyhow::anyhow!(
            "Invalid Signature"
        )));
    }

    let payment = repo
        .find_payment_by_order(&request.razorpay_order_id)
        .await?
        .ok_or_else(order_not_found)?;

    if payment.user_id != user_id {
        tracing::warn!(
            security_event = true,
            user_id = %user_id,
            order_id = %request.razorpay_order_id,
            "Verify attempted on another user's order"
        );
        return Err(order_not_found());
    }

    if payment.plan_id != request.plan_id {
        tracing::warn!(
            security_event = true,
            user_id = %user_id,
            order_id = %request.razorpay_order_id,
            order_plan_id = %payment.plan_id,
            requested_plan_id = %request.plan_id,
            "Verify planId does not match the order"
        );
        record_capture("verify", "plan_mismatch");
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Plan does not match order"
        )));
    }

    let plan = repo
        .get_plan(payment.plan_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not found")))?;

    let capture = PaymentCapture {
        razorpay_order_id: request.razorpay_order_id,
        razorpay_payment_id: request.razorpay_payment_id,
        user_id: user_id.to_string(),
        plan_id: plan.plan_id,
        plan_price: plan.price,
        total_installments: plan.installment_count(),
        validity_days: plan.validity_days,
        captured_at: now,
    };

    match repo.capture_payment(&capture).await? {
        CaptureOutcome::Applied { subscription, .. } => {
            record_capture("verify", "applied");
            tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription.subscription_id,
                installments_paid = subscription.installments_paid,
                "Payment verified"
            );
            Ok(VerifiedPayment {
                subscription_id: subscription.subscription_id,
                duplicate: false,
            })
        }
        CaptureOutcome::AlreadyApplied { subscription_id } => {
            record_capture("verify", "duplicate");
            Ok(VerifiedPayment {
                subscription_id,
                duplicate: true,
            })
        }
        CaptureOutcome::OrderNotFound => Err(order_not_found()),
    }
}

fn event_label(event: &str) -> &'static str {
    match event {
        REFUND_PROCESSED => REFUND_PROCESSED,
        REFUND_FAILED => REFUND_FAILED,
        PAYMENT_CAPTURED => PAYMENT_CAPTURED,
        _ => "other",
    }
}

/// Verify and apply a Razorpay webhook delivery.
///
/// Unknown events and undecodable bodies are acknowledged; only store
/// failures surface so the provider retries.
pub async fn handle_webhook(
    repo: &dyn CommerceRepository,
    verifier: &SignatureVerifier,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), AppError> {
    let signature = match signature.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sig) if verifier.webhook_secret_configured() => sig,
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Missing signature or secret"
            )))
        }
    };

    if !verifier.verify_webhook(body, signature) {
        tracing::warn!(security_event = true, "Webhook signature mismatch");
        record_webhook("unverified", "rejected");
        return Err(AppError::SignatureMismatch(anyhow::anyhow!(
            "Invalid signature"
        )));
    }

    let event: WebhookEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable webhook body acknowledged");
            record_webhook("other", "undecodable");
            return Ok(());
        }
    };

    let label = event_label(&event.event);
    let result = apply_event(repo, &event).await;
    match &result {
        Ok(()) => record_webhook(label, "ok"),
        Err(e) => {
            tracing::error!(event = %event.event, error = %e, "Webhook processing failed");
            record_webhook(label, "error");
        }
    }
    result
}

async fn apply_event(repo: &dyn CommerceRepository, event: &WebhookEvent) -> Result<(), AppError> {
    match event.event.as_str() {
        REFUND_PROCESSED | REFUND_FAILED => {
            let Some(refund) = event.payload.refund.as_ref().map(|e| &e.entity) else {
                tracing::warn!(event = %event.event, "Refund event without refund entity");
                return Ok(());
            };
            let succeeded = event.event == REFUND_PROCESSED;

            match refund.subscription_id().map(Uuid::parse_str) {
                Some(Ok(subscription_id)) => {
                    let status = if succeeded {
                        SubscriptionStatus::Refunded
                    } else {
                        SubscriptionStatus::Canceled
                    };
                    if repo.set_subscription_status(subscription_id, status).await? {
                        tracing::info!(
                            subscription_id = %subscription_id,
                            status = status.as_str(),
                            refund_id = %refund.id,
                            "Subscription updated from refund webhook"
                        );
                    } else {
                        tracing::warn!(
                            subscription_id = %subscription_id,
                            "Refund webhook for unknown subscription"
                        );
                    }
                }
                Some(Err(_)) | None => {
                    tracing::warn!(
                        refund_id = %refund.id,
                        "Refund webhook without a usable subscriptionId in notes"
                    );
                }
            }

            if let Some(payment_id) = refund.payment_id.as_deref() {
                if succeeded {
                    repo.transition_payment_status(
                        payment_id,
                        &[PaymentStatus::Captured, PaymentStatus::RefundPending],
                        PaymentStatus::Refunded,
                    )
                    .await?;
                } else {
                    repo.transition_payment_status(
                        payment_id,
                        &[PaymentStatus::RefundPending],
                        PaymentStatus::Captured,
                    )
                    .await?;
                }
            }
        }
        PAYMENT_CAPTURED => {
            let Some(payment) = event.payload.payment.as_ref().map(|e| &e.entity) else {
                tracing::warn!("payment.captured without payment entity");
                return Ok(());
            };
            let Some(order_id) = payment.order_id.as_deref() else {
                tracing::warn!(payment_id = %payment.id, "payment.captured without order_id");
                return Ok(());
            };

            if repo.mark_order_captured(order_id, &payment.id).await? {
                record_capture("webhook", "marked");
            } else {
                tracing::info!(
                    order_id = %order_id,
                    "payment.captured for unknown or refunded order"
                );
            }
        }
        other => {
            tracing::debug!(event = %other, "Ignoring webhook event");
        }
    }

    Ok(())
}
