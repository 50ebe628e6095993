//! Subscription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
    RefundProcessing,
    Refunded,
    Expired,
    PendingInstallment,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::RefundProcessing => "REFUND_PROCESSING",
            SubscriptionStatus::Refunded => "REFUNDED",
            SubscriptionStatus::Expired => "EXPIRED",
            SubscriptionStatus::PendingInstallment => "PENDING_INSTALLMENT",
        }
    }

    /// Unknown values decode as `Expired` so they never grant access.
    pub fn from_string(s: &str) -> Self {
        match s {
            "ACTIVE" => SubscriptionStatus::Active,
            "PAST_DUE" => SubscriptionStatus::PastDue,
            "CANCELED" => SubscriptionStatus::Canceled,
            "REFUND_PROCESSING" => SubscriptionStatus::RefundProcessing,
            "REFUNDED" => SubscriptionStatus::Refunded,
            "PENDING_INSTALLMENT" => SubscriptionStatus::PendingInstallment,
            _ => SubscriptionStatus::Expired,
        }
    }
}

/// A user's purchase of a plan. One row per (user, plan).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub user_id: String,
    pub plan_id: Uuid,
    pub status: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_amount: i64,
    pub amount_paid: i64,
    pub installments_paid: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }

    pub fn is_active(&self) -> bool {
        self.status() == SubscriptionStatus::Active
    }
}
