pub mod access;
pub mod account;
pub mod cancellation;
pub mod database;
pub mod ledger;
pub mod metrics;
pub mod orders;
pub mod pricing;
pub mod razorpay;
pub mod repository;
pub mod seasons;
pub mod throttle;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use razorpay::{PaymentGateway, RazorpayClient, SignatureVerifier};
pub use repository::CommerceRepository;
pub use throttle::{LocalOrderThrottle, OrderThrottle, RedisOrderThrottle};
