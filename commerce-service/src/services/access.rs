//! Access evaluation: a pure function of (now, subscription, plan).
//!
//! Installment plans unlock coverage in equal slices of the validity window.
//! Access survives a 24 hour grace period past the end of the paid coverage,
//! then flips to `OVERDUE_PAYMENT` until the next installment is captured.

use crate::models::{Plan, Subscription};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub const DAY_MS: i64 = 86_400_000;
pub const GRACE_PERIOD_MS: i64 = 24 * 3_600_000;
/// Reminders start this many days before the next installment is due.
pub const DUE_SOON_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessStatus {
    Granted,
    PaymentDueSoon,
    NoSubscription,
    OverduePayment,
    Expired,
}

impl AccessStatus {
    /// Whether paid features should be unlocked.
    pub fn has_access(&self) -> bool {
        matches!(self, AccessStatus::Granted | AccessStatus::PaymentDueSoon)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub status: AccessStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until_due: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AccessDecision {
    fn new(status: AccessStatus) -> Self {
        Self {
            status,
            next_due_date: None,
            days_until_due: None,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn with_due(mut self, due: DateTime<Utc>, days: i64) -> Self {
        self.next_due_date = Some(due);
        self.days_until_due = Some(days);
        self
    }
}

/// `ceil(ms / DAY_MS)` for signed values.
fn ceil_days(ms: i64) -> i64 {
    let q = ms / DAY_MS;
    if ms % DAY_MS > 0 {
        q + 1
    } else {
        q
    }
}

/// Evaluate entitlement for the user's ACTIVE subscription, if any.
pub fn evaluate_access(
    now: DateTime<Utc>,
    entitlement: Option<(&Subscription, &Plan)>,
) -> AccessDecision {
    let Some((subscription, plan)) = entitlement.filter(|(s, _)| s.is_active()) else {
        return AccessDecision::new(AccessStatus::NoSubscription)
            .with_message("User has no active subscription.");
    };

    let validity_days = i64::from(plan.validity_days);
    if validity_days <= 0 {
        return AccessDecision::new(AccessStatus::Expired).with_message("Plan validity is not set.");
    }

    let start = subscription.start_date;
    let expiry = start + Duration::milliseconds(validity_days * DAY_MS);
    if now > expiry {
        return AccessDecision::new(AccessStatus::Expired)
            .with_message("Plan validity has expired.");
    }

    let total = i64::from(plan.installment_count());
    // A subscription row only exists after a capture, so zero reads as one.
    let paid = match i64::from(subscription.installments_paid) {
        0 => 1,
        n => n,
    };

    if paid >= total {
        return AccessDecision::new(AccessStatus::Granted);
    }

    let covered_ms = validity_days * paid * DAY_MS / total;
    let coverage_end = start + Duration::milliseconds(covered_ms);
    let strict_cutoff = coverage_end + Duration::milliseconds(GRACE_PERIOD_MS);
    let days_until_due = ceil_days((coverage_end - now).num_milliseconds());

    if now > strict_cutoff {
        return AccessDecision::new(AccessStatus::OverduePayment)
            .with_due(coverage_end, days_until_due)
            .with_message(format!(
                "Installment overdue. Your access expired on {}.",
                coverage_end.format("%a %b %d %Y")
            ));
    }

    if days_until_due <= DUE_SOON_WINDOW_DAYS {
        return AccessDecision::new(AccessStatus::PaymentDueSoon)
            .with_due(coverage_end, days_until_due)
            .with_message(format!("Upcoming payment. Due in {} days.", days_until_due));
    }

    AccessDecision::new(AccessStatus::Granted).with_due(coverage_end, days_until_due)
}
