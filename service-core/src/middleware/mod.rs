pub mod metrics;
pub mod rate_limit;
pub mod signature;
pub mod tracing;
