//! Purchase classification and order amount calculation.

pub use crate::models::PaymentMode;
use crate::models::{Plan, Subscription};

/// Where a user stands with a plan before a new order is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseState {
    NoPriorAttempt,
    /// Continue at this 1-based installment index.
    ResumeAtInstallment(i32),
    AlreadyComplete,
}

impl PurchaseState {
    /// Classify from the user's subscription row for this plan, whatever
    /// its status.
    pub fn classify(existing: Option<&Subscription>, plan: &Plan) -> Self {
        let Some(sub) = existing else {
            return PurchaseState::NoPriorAttempt;
        };

        let fully_paid = sub.amount_paid > 0 && sub.amount_paid >= sub.total_amount;
        if fully_paid || sub.installments_paid >= plan.installment_count() {
            return PurchaseState::AlreadyComplete;
        }

        PurchaseState::ResumeAtInstallment(sub.installments_paid.max(0) + 1)
    }

    pub fn installment_index(&self) -> i32 {
        match self {
            PurchaseState::ResumeAtInstallment(n) => *n,
            _ => 1,
        }
    }
}

/// Priced order ready to send to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub amount: i64,
    pub installment_mode: bool,
    pub installment_index: i32,
    pub description: String,
}

/// Price the next order. `None` when nothing is left to pay.
///
/// floor(amount * percent / 100) without forming the full product.
fn percent_of(amount: i64, percent: i64) -> i64 {
    amount / 100 * percent + amount % 100 * percent / 100
}

/// Past the first installment the order is always an installment; otherwise
/// the requested mode applies when the plan allows it.
pub fn quote(plan: &Plan, mode: PaymentMode, state: PurchaseState) -> Option<Quote> {
    if state == PurchaseState::AlreadyComplete {
        return None;
    }

    let count = plan.installment_count();
    let index = state.installment_index();
    let forced = index > 1 && count > 1;
    let requested = mode == PaymentMode::Installment && plan.allow_installments && count > 1;

    if forced || requested {
        return Some(Quote {
            amount: plan.price / i64::from(count),
            installment_mode: true,
            installment_index: index,
            description: format!("Installment {} of {}", index, count),
        });
    }

    let discount = i64::from(plan.full_payment_discount.clamp(0, 100));
    Some(Quote {
        amount: plan.price - percent_of(plan.price, discount),
        installment_mode: false,
        installment_index: index,
        description: format!(
            "Full Payment (Inc. {}% Discount)",
            plan.full_payment_discount
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn plan(price: i64, installments: i32, discount: i32) -> Plan {
        let now = Utc::now();
        Plan {
            plan_id: Uuid::new_v4(),
            batch_id: Uuid::new_v4(),
            title: "Voyager".to_string(),
            description: None,
            price,
            features: vec![],
            validity_days: 365,
            allow_installments: installments > 1,
            total_installments: installments,
            full_payment_discount: discount,
            is_active: true,
            created_utc: now,
            updated_utc: now,
        }
    }

    fn subscription(plan: &Plan, paid: i32, amount_paid: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            subscription_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            plan_id: plan.plan_id,
            status: "CANCELED".to_string(),
            start_date: now,
            end_date: now,
            total_amount: plan.price,
            amount_paid,
            installments_paid: paid,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn full_payment_applies_discount() {
        let q = quote(&plan(10_000, 1, 10), PaymentMode::Full, PurchaseState::NoPriorAttempt)
            .unwrap();
        assert_eq!(q.amount, 9_000);
        assert!(!q.installment_mode);
        assert_eq!(q.description, "Full Payment (Inc. 10% Discount)");
    }

    #[test]
    fn discount_on_huge_price_does_not_overflow() {
        let q = quote(&plan(i64::MAX, 1, 10), PaymentMode::Full, PurchaseState::NoPriorAttempt)
            .unwrap();
        assert_eq!(q.amount, i64::MAX - i64::MAX / 100 * 10 - 7 * 10 / 100);
        assert!(q.amount > 0);
    }

    #[test]
    fn discount_rounds_in_favour_of_the_buyer() {
        let q = quote(&plan(999, 1, 15), PaymentMode::Full, PurchaseState::NoPriorAttempt)
            .unwrap();
        // floor(999 * 15 / 100) = 149
        assert_eq!(q.amount, 850);
    }

    #[test]
    fn installment_amount_is_floored() {
        let q = quote(
            &plan(10_000, 4, 10),
            PaymentMode::Installment,
            PurchaseState::NoPriorAttempt,
        )
        .unwrap();
        assert_eq!(q.amount, 2_500);
        assert_eq!(q.description, "Installment 1 of 4");

        let q = quote(
            &plan(10_001, 3, 0),
            PaymentMode::Installment,
            PurchaseState::NoPriorAttempt,
        )
        .unwrap();
        assert_eq!(q.amount, 3_333);
    }

    #[test]
    fn installment_request_ignored_when_not_allowed() {
        let mut p = plan(10_000, 4, 0);
        p.allow_installments = false;
        let q = quote(&p, PaymentMode::Installment, PurchaseState::NoPriorAttempt).unwrap();
        assert_eq!(q.amount, 10_000);
        assert!(!q.installment_mode);
    }

    #[test]
    fn later_installments_are_forced() {
        let q = quote(
            &plan(10_000, 4, 10),
            PaymentMode::Full,
            PurchaseState::ResumeAtInstallment(3),
        )
        .unwrap();
        assert_eq!(q.amount, 2_500);
        assert_eq!(q.installment_index, 3);
        assert_eq!(q.description, "Installment 3 of 4");
    }

    #[test]
    fn nothing_to_quote_when_complete() {
        assert!(quote(
            &plan(10_000, 1, 0),
            PaymentMode::Full,
            PurchaseState::AlreadyComplete
        )
        .is_none());
    }

    #[test]
    fn classify_resume_and_completion() {
        let p = plan(10_000, 4, 0);
        assert_eq!(PurchaseState::classify(None, &p), PurchaseState::NoPriorAttempt);
        assert_eq!(
            PurchaseState::classify(Some(&subscription(&p, 2, 5_000)), &p),
            PurchaseState::ResumeAtInstallment(3)
        );
        assert_eq!(
            PurchaseState::classify(Some(&subscription(&p, 4, 10_000)), &p),
            PurchaseState::AlreadyComplete
        );
    }

    #[test]
    fn discounted_full_payment_counts_as_complete() {
        let p = plan(10_000, 1, 10);
        assert_eq!(
            PurchaseState::classify(Some(&subscription(&p, 1, 9_000)), &p),
            PurchaseState::AlreadyComplete
        );
    }
}
