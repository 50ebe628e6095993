use crate::error::AppError;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

/// Rate limiter keyed by an arbitrary string (user id, client id).
pub type KeyedRateLimiter =
    Arc<RateLimiter<String, DashMapStateStore<String>, DefaultClock>>;

/// Allow `burst` calls per key, replenishing one every `period`.
pub fn create_keyed_rate_limiter(
    period: Duration,
    burst: u32,
) -> Result<KeyedRateLimiter, AppError> {
    let quota = Quota::with_period(period)
        .ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!("Rate limit period must be non-zero"))
        })?
        .allow_burst(NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN));

    Ok(Arc::new(RateLimiter::dashmap(quota)))
}

/// Returns the wait before `key` may proceed, or `None` if the call is admitted.
pub fn check_key(limiter: &KeyedRateLimiter, key: &str) -> Option<Duration> {
    match limiter.check_key(&key.to_string()) {
        Ok(_) => None,
        Err(negative) => Some(negative.wait_time_from(DefaultClock::default().now())),
    }
}

/// Admit `key` or fail with 429 and a `Retry-After` rounded up to whole seconds.
pub fn enforce_key(limiter: &KeyedRateLimiter, key: &str, message: &str) -> Result<(), AppError> {
    match check_key(limiter, key) {
        None => Ok(()),
        Some(wait) => {
            let retry_after = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            Err(AppError::TooManyRequests(
                message.to_string(),
                Some(retry_after.max(1)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_within_period_is_rejected() {
        let limiter = create_keyed_rate_limiter(Duration::from_secs(2), 1).unwrap();
        assert!(check_key(&limiter, "user_1").is_none());
        assert!(check_key(&limiter, "user_1").is_some());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = create_keyed_rate_limiter(Duration::from_secs(2), 1).unwrap();
        assert!(check_key(&limiter, "user_1").is_none());
        assert!(check_key(&limiter, "user_2").is_none());
    }

    #[test]
    fn enforce_reports_retry_after() {
        let limiter = create_keyed_rate_limiter(Duration::from_secs(2), 1).unwrap();
        enforce_key(&limiter, "u", "wait").unwrap();
        match enforce_key(&limiter, "u", "wait") {
            Err(AppError::TooManyRequests(msg, Some(retry))) => {
                assert_eq!(msg, "wait");
                assert!((1..=2).contains(&retry));
            }
            other => panic!("expected 429, got {:?}", other.err()),
        }
    }

    #[test]
    fn zero_period_is_a_config_error() {
        assert!(matches!(
            create_keyed_rate_limiter(Duration::ZERO, 1),
            Err(AppError::ConfigError(_))
        ));
    }
}
