//! Persistence contract for the commerce domain.
//!
//! Multi-statement operations (launch, capture, cancellation settlement,
//! batch and plan removal) are single calls so each implementation can make
//! them atomic.

use crate::models::{
    Batch, NewPayment, NewPlan, Payment, PaymentStatus, Plan, SeasonUpdate, Subscription,
    SubscriptionStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Result of a season delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDeletion {
    Deleted,
    NotFound,
    /// A plan of the batch has been purchased; nothing was removed.
    HasSubscriptions,
}

/// Result of a plan delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRemoval {
    Deleted,
    /// Sales exist, so the plan was hidden instead.
    Archived,
    NotFound,
}

/// A verified checkout to be applied to the ledger.
#[derive(Debug, Clone)]
pub struct PaymentCapture {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub user_id: String,
    pub plan_id: Uuid,
    pub plan_price: i64,
    pub total_installments: i32,
    pub validity_days: i32,
    pub captured_at: DateTime<Utc>,
}

impl PaymentCapture {
    pub fn end_date(&self) -> DateTime<Utc> {
        self.captured_at + chrono::Duration::days(i64::from(self.validity_days))
    }
}

#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    Applied {
        subscription: Subscription,
        payment: Payment,
    },
    /// The payment was already linked to a subscription; nothing changed.
    AlreadyApplied {
        subscription_id: Uuid,
    },
    OrderNotFound,
}

/// Final state written when a cancellation completes.
#[derive(Debug, Clone)]
pub struct CancellationSettlement {
    pub subscription_id: Uuid,
    pub subscription_status: SubscriptionStatus,
    pub ended_at: DateTime<Utc>,
    /// Payment row to move to `refunded` / `refund_pending`, if any.
    pub payment: Option<(Uuid, PaymentStatus)>,
}

#[async_trait]
pub trait CommerceRepository: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Seasons

    /// Archive every ACTIVE batch, insert the new ACTIVE batch and its plans.
    async fn launch_season(
        &self,
        name: &str,
        registration_close_date: Option<DateTime<Utc>>,
        plans: &[NewPlan],
        now: DateTime<Utc>,
    ) -> Result<(Batch, Vec<Plan>), AppError>;

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, AppError>;

    async fn active_batch(&self) -> Result<Option<Batch>, AppError>;

    async fn update_batch(
        &self,
        batch_id: Uuid,
        update: &SeasonUpdate,
    ) -> Result<Option<Batch>, AppError>;

    async fn delete_batch(&self, batch_id: Uuid) -> Result<BatchDeletion, AppError>;

    // Plans

    async fn create_plan(&self, batch_id: Uuid, plan: &NewPlan) -> Result<Plan, AppError>;

    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError>;

    async fn update_plan(&self, plan_id: Uuid, plan: &NewPlan) -> Result<Option<Plan>, AppError>;

    async fn delete_or_archive_plan(&self, plan_id: Uuid) -> Result<PlanRemoval, AppError>;

    async fn list_plans(&self, batch_id: Uuid) -> Result<Vec<Plan>, AppError>;

    // Subscriptions

    async fn find_active_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError>;

    /// The (user, plan) row regardless of status.
    async fn find_subscription(
        &self,
        user_id: &str,
        plan_id: Uuid,
    ) -> Result<Option<Subscription>, AppError>;

    /// Returns false when no row matched.
    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError>;

    // Payments

    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, AppError>;

    async fn find_payment_by_order(
        &self,
        razorpay_order_id: &str,
    ) -> Result<Option<Payment>, AppError>;

    /// Lock the payment row, create or extend the subscription and link the
    /// payment, all in one transaction.
    async fn capture_payment(&self, capture: &PaymentCapture) -> Result<CaptureOutcome, AppError>;

    /// Webhook safety net: mark the order captured unless it already moved
    /// on to a refund state.
    async fn mark_order_captured(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> Result<bool, AppError>;

    /// Move the payment identified by provider payment id from one status to
    /// another. Returns false when no row was in `from`.
    async fn transition_payment_status(
        &self,
        razorpay_payment_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError>;

    async fn latest_captured_payment(&self, user_id: &str) -> Result<Option<Payment>, AppError>;

    /// Newest first.
    async fn list_payments(&self, user_id: &str) -> Result<Vec<Payment>, AppError>;

    async fn settle_cancellation(
        &self,
        settlement: &CancellationSettlement,
    ) -> Result<(), AppError>;
}
