//! Membership plan model and admin input.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A purchasable tier inside a season. Price is in paise.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub plan_id: Uuid,
    pub batch_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub features: Vec<String>,
    pub validity_days: i32,
    pub allow_installments: bool,
    pub total_installments: i32,
    pub full_payment_discount: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Plan {
    /// Installment count used for pricing and coverage, never below 1.
    pub fn installment_count(&self) -> i32 {
        self.total_installments.max(1)
    }
}

fn default_validity_days() -> i32 {
    365
}

fn default_installments() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

/// Upper bound on a plan price, in rupees.
pub const MAX_PRICE_RUPEES: i64 = 10_000_000;

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ONE {
        let mut err = ValidationError::new("price_min");
        err.message = Some("Price must be at least 1".into());
        return Err(err);
    }
    if *price > Decimal::from(MAX_PRICE_RUPEES) {
        let mut err = ValidationError::new("price_max");
        err.message = Some(format!("Price must be at most {}", MAX_PRICE_RUPEES).into());
        return Err(err);
    }
    Ok(())
}

/// Plan fields as entered in the admin console; price is in rupees.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    #[validate(length(min = 2, message = "Plan title must be at least 2 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_validity_days")]
    #[validate(range(min = 1, message = "Validity must be at least 1 day"))]
    pub validity_days: i32,
    #[serde(default)]
    pub allow_installments: bool,
    #[serde(default = "default_installments", alias = "installments")]
    #[validate(range(min = 1, max = 24, message = "Installments must be between 1 and 24"))]
    pub total_installments: i32,
    #[serde(default, alias = "discount")]
    #[validate(range(min = 0, max = 100, message = "Discount must be between 0 and 100"))]
    pub full_payment_discount: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Normalised plan ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan {
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub features: Vec<String>,
    pub validity_days: i32,
    pub allow_installments: bool,
    pub total_installments: i32,
    pub full_payment_discount: i32,
    pub is_active: bool,
}

impl PlanInput {
    /// Rupees to paise, blank features dropped, and installments collapsed
    /// to 1 unless allowed and more than one requested.
    pub fn normalize(&self) -> NewPlan {
        let price = (self.price * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .unwrap_or(i64::MAX);

        let total_installments = if self.allow_installments && self.total_installments > 1 {
            self.total_installments
        } else {
            1
        };

        NewPlan {
            title: self.title.trim().to_string(),
            description: self
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            price,
            features: self
                .features
                .iter()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            validity_days: self.validity_days,
            allow_installments: self.allow_installments,
            total_installments,
            full_payment_discount: self.full_payment_discount,
            is_active: self.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::error::first_validation_message;

    fn input(json: serde_json::Value) -> PlanInput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let plan = input(serde_json::json!({ "title": "Explorer", "price": 499 }));
        assert_eq!(plan.validity_days, 365);
        assert_eq!(plan.total_installments, 1);
        assert_eq!(plan.full_payment_discount, 0);
        assert!(plan.is_active);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn price_is_stored_in_paise() {
        let plan = input(serde_json::json!({ "title": "Explorer", "price": "499.50" }));
        assert_eq!(plan.normalize().price, 49950);
    }

    #[test]
    fn installments_collapse_when_not_allowed() {
        let plan = input(serde_json::json!({
            "title": "Voyager",
            "price": 12000,
            "allowInstallments": false,
            "installments": 4
        }));
        assert_eq!(plan.normalize().total_installments, 1);

        let plan = input(serde_json::json!({
            "title": "Voyager",
            "price": 12000,
            "allowInstallments": true,
            "totalInstallments": 4
        }));
        assert_eq!(plan.normalize().total_installments, 4);
    }

    #[test]
    fn rejects_price_below_one_rupee() {
        let plan = input(serde_json::json!({ "title": "Explorer", "price": 0.5 }));
        let errors = plan.validate().unwrap_err();
        assert_eq!(
            first_validation_message(&errors),
            "price: Price must be at least 1"
        );
    }

    #[test]
    fn rejects_price_that_would_overflow_paise() {
        let plan = input(serde_json::json!({
            "title": "Explorer",
            "price": "92233720368547758.07"
        }));
        let errors = plan.validate().unwrap_err();
        assert_eq!(
            first_validation_message(&errors),
            "price: Price must be at most 10000000"
        );

        let ceiling = input(serde_json::json!({ "title": "Explorer", "price": MAX_PRICE_RUPEES }));
        assert!(ceiling.validate().is_ok());
        assert_eq!(ceiling.normalize().price, MAX_PRICE_RUPEES * 100);
    }

    #[test]
    fn rejects_discount_above_hundred() {
        let plan = input(serde_json::json!({
            "title": "Explorer",
            "price": 100,
            "discount": 120
        }));
        assert!(plan.validate().is_err());
    }
}
