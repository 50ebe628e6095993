//! Payment model: one row per provider order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Payment status, stored lowercase as the provider reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
    Refunded,
    RefundPending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::RefundPending => "refund_pending",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "captured" => PaymentStatus::Captured,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            "refund_pending" => PaymentStatus::RefundPending,
            _ => PaymentStatus::Created,
        }
    }
}

/// How an order was priced: the whole plan, or one installment of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    Full,
    Installment,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Full => "FULL",
            PaymentMode::Installment => "INSTALLMENT",
        }
    }

    pub fn from_string(s: &str) -> Self {
        if s.eq_ignore_ascii_case("FULL") {
            PaymentMode::Full
        } else {
            PaymentMode::Installment
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_id: Uuid,
    pub user_id: String,
    pub subscription_id: Option<Uuid>,
    /// Plan the order was priced for.
    pub plan_id: Uuid,
    pub razorpay_order_id: String,
    pub razorpay_payment_id: Option<String>,
    pub amount: i64,
    pub status: String,
    pub payment_mode: String,
    pub installment_index: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }

    pub fn payment_mode(&self) -> PaymentMode {
        PaymentMode::from_string(&self.payment_mode)
    }
}

/// Row written right after the provider order is created.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: String,
    pub plan_id: Uuid,
    pub razorpay_order_id: String,
    pub amount: i64,
    pub payment_mode: PaymentMode,
    pub installment_index: i32,
}
