//! Configuration for commerce-service, loaded from the environment.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config::Config as CoreConfig;
use std::env;

pub const DEFAULT_RAZORPAY_API: &str = "https://api.razorpay.com/v1";

#[derive(Deserialize, Clone, Debug)]
pub struct CommerceConfig {
    pub common: CoreConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub signature: ServiceSignatureConfig,
    pub razorpay: RazorpayConfig,
    pub throttle: ThrottleConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// BFF request signing. On unless explicitly disabled, since session
/// headers are only trustworthy behind it.
#[derive(Deserialize, Clone, Debug)]
pub struct ServiceSignatureConfig {
    pub enabled: bool,
    pub client_id: String,
    pub secret: Secret<String>,
}

impl ServiceSignatureConfig {
    const DEV_SECRET: &'static str = "dev-secret";

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let enabled = lookup("COMMERCE_SIGNATURE_ENABLED")
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);
        let secret = lookup("COMMERCE_SIGNATURE_SECRET")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Self::DEV_SECRET.to_string());
        if enabled && secret == Self::DEV_SECRET {
            anyhow::bail!("COMMERCE_SIGNATURE_SECRET must be set when signatures are enabled");
        }

        Ok(Self {
            enabled,
            client_id: lookup("COMMERCE_SIGNATURE_CLIENT_ID")
                .unwrap_or_else(|| "orbit-web".to_string()),
            secret: Secret::new(secret),
        })
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    /// Empty means webhooks are rejected.
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
}

impl RazorpayConfig {
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.expose_secret().is_empty()
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ThrottleConfig {
    /// Redis lease shared by every instance; `false` keeps a per-process map.
    pub shared: bool,
    pub window_ms: u64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn flag(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl CommerceConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let common = CoreConfig::load().map_err(|e| anyhow::anyhow!("{}", e))?;

        let db_url = env::var("COMMERCE_DATABASE_URL")
            .context("COMMERCE_DATABASE_URL must be set")?;
        let max_connections = var_or("COMMERCE_DB_MAX_CONNECTIONS", "10")
            .parse()
            .context("COMMERCE_DB_MAX_CONNECTIONS must be a number")?;
        let min_connections = var_or("COMMERCE_DB_MIN_CONNECTIONS", "1")
            .parse()
            .context("COMMERCE_DB_MIN_CONNECTIONS must be a number")?;

        let redis_url = var_or("COMMERCE_REDIS_URL", "redis://localhost:6379");

        let signature = ServiceSignatureConfig::from_lookup(|key| env::var(key).ok())?;

        Ok(Self {
            common,
            database: DatabaseConfig {
                url: Secret::new(db_url),
                max_connections,
                min_connections,
            },
            redis: RedisConfig {
                url: Secret::new(redis_url),
            },
            signature,
            razorpay: RazorpayConfig {
                key_id: var_or("RAZORPAY_KEY_ID", ""),
                key_secret: Secret::new(var_or("RAZORPAY_KEY_SECRET", "")),
                webhook_secret: Secret::new(var_or("RAZORPAY_WEBHOOK_SECRET", "")),
                api_base_url: var_or("RAZORPAY_API_BASE_URL", DEFAULT_RAZORPAY_API),
            },
            throttle: ThrottleConfig {
                shared: flag("ORDER_THROTTLE_SHARED", true),
                window_ms: var_or("ORDER_THROTTLE_WINDOW_MS", "2000")
                    .parse()
                    .context("ORDER_THROTTLE_WINDOW_MS must be a number")?,
            },
            service_name: var_or("SERVICE_NAME", "commerce-service"),
            log_level: var_or("LOG_LEVEL", "info"),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
        })
    }
}
