//! Domain models for seasons, plans, subscriptions and payments.

pub mod batch;
pub mod payment;
pub mod plan;
pub mod subscription;

pub use batch::{parse_date_input, Batch, BatchStatus, FieldUpdate, SeasonUpdate};
pub use payment::{NewPayment, Payment, PaymentMode, PaymentStatus};
pub use plan::{NewPlan, Plan, PlanInput};
pub use subscription::{Subscription, SubscriptionStatus};
