//! Per-user order throttle.
//!
//! One order request per user per window. The Redis lease is shared by every
//! instance; the local variant only sees its own process.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use service_core::error::AppError;
use service_core::middleware::rate_limit::{
    create_keyed_rate_limiter, enforce_key, KeyedRateLimiter,
};
use std::time::Duration;

pub const THROTTLE_MESSAGE: &str = "Please wait a moment before trying again.";

#[async_trait]
pub trait OrderThrottle: Send + Sync {
    /// Admit the user or fail with 429.
    async fn acquire(&self, user_id: &str) -> Result<(), AppError>;
}

fn retry_after_secs(window: Duration) -> u64 {
    let secs = window.as_secs() + u64::from(window.subsec_nanos() > 0);
    secs.max(1)
}

/// `SET order_throttle:{user} 1 NX PX {window}`.
#[derive(Clone)]
pub struct RedisOrderThrottle {
    manager: ConnectionManager,
    window: Duration,
}

impl RedisOrderThrottle {
    pub async fn new(client: &redis::Client, window: Duration) -> Result<Self, AppError> {
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            AppError::RedisError(e)
        })?;
        Ok(Self { manager, window })
    }

    fn key(user_id: &str) -> String {
        format!("order_throttle:{}", user_id)
    }
}

#[async_trait]
impl OrderThrottle for RedisOrderThrottle {
    async fn acquire(&self, user_id: &str) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(Self::key(user_id))
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(self.window.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        if acquired.is_none() {
            tracing::info!(user_id = %user_id, "Order throttled");
            return Err(AppError::TooManyRequests(
                THROTTLE_MESSAGE.to_string(),
                Some(retry_after_secs(self.window)),
            ));
        }

        Ok(())
    }
}

/// Process-local throttle for single-instance deployments and tests.
#[derive(Clone)]
pub struct LocalOrderThrottle {
    limiter: KeyedRateLimiter,
}

impl LocalOrderThrottle {
    pub fn new(window: Duration) -> Result<Self, AppError> {
        Ok(Self {
            limiter: create_keyed_rate_limiter(window, 1)?,
        })
    }
}

#[async_trait]
impl OrderThrottle for LocalOrderThrottle {
    async fn acquire(&self, user_id: &str) -> Result<(), AppError> {
        enforce_key(&self.limiter, user_id, THROTTLE_MESSAGE)
            .inspect_err(|_| tracing::info!(user_id = %user_id, "Order throttled"))
    }
}
