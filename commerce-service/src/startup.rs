//! Application startup and lifecycle management.

use crate::config::CommerceConfig;
use crate::handlers;
use crate::services::{
    CommerceRepository, Database, LocalOrderThrottle, OrderThrottle, PaymentGateway,
    RazorpayClient, RedisOrderThrottle, SignatureVerifier,
};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, patch, post, put};
use axum::Router;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    signature::{
        signature_validation_middleware, SignatureConfig, SignatureStore, MAX_SKEW_SECONDS,
    },
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn CommerceRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub throttle: Arc<dyn OrderThrottle>,
    pub verifier: SignatureVerifier,
    pub signature_config: SignatureConfig,
    pub signing_client_id: String,
    pub signing_secret: Secret<String>,
    /// Nonce store for signed requests; `None` skips replay checks.
    pub redis: Option<redis::Client>,
}

impl AsRef<SignatureConfig> for AppState {
    fn as_ref(&self) -> &SignatureConfig {
        &self.signature_config
    }
}

#[async_trait::async_trait]
impl SignatureStore for AppState {
    async fn validate_nonce(&self, nonce: &str) -> Result<bool, AppError> {
        let Some(redis) = &self.redis else {
            return Ok(true);
        };

        let mut con = redis.get_multiplexed_async_connection().await.map_err(|e| {
            tracing::error!("Failed to get redis connection: {}", e);
            AppError::RedisError(e)
        })?;

        let stored: Option<String> = redis::cmd("SET")
            .arg(format!("nonce:{}", nonce))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(MAX_SKEW_SECONDS * 2)
            .query_async(&mut con)
            .await?;

        Ok(stored.is_some())
    }

    async fn get_signing_secret(&self, client_id: &str) -> Result<Option<String>, AppError> {
        if client_id == self.signing_client_id {
            Ok(Some(self.signing_secret.expose_secret().clone()))
        } else {
            Ok(None)
        }
    }
}

/// Routes and middleware stack, shared by the server and router tests.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics))
        // Catalog
        .route("/plans", get(handlers::catalog::list_plans))
        .route("/admin/seasons", post(handlers::catalog::launch_season))
        .route(
            "/admin/seasons/:id",
            patch(handlers::catalog::update_season).delete(handlers::catalog::delete_season),
        )
        .route("/admin/plans", post(handlers::catalog::create_plan))
        .route(
            "/admin/plans/:id",
            put(handlers::catalog::update_plan).delete(handlers::catalog::delete_plan),
        )
        // Checkout
        .route("/orders", post(handlers::checkout::create_order))
        .route("/payment/verify", post(handlers::checkout::verify_payment))
        .route("/payment/webhook", post(handlers::checkout::webhook))
        // Account
        .route(
            "/subscriptions/access",
            get(handlers::account::access_status),
        )
        .route(
            "/subscriptions/cancel",
            post(handlers::account::cancel_subscription),
        )
        .route("/payments", get(handlers::account::list_payments))
        .layer(from_fn_with_state(
            state.clone(),
            signature_validation_middleware::<AppState>,
        ))
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CommerceConfig) -> Result<Self, AppError> {
        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;
        db.run_migrations().await?;

        let redis = redis::Client::open(config.redis.url.expose_secret().as_str())
            .map_err(|e| {
                tracing::error!("Failed to connect to Redis: {}", e);
                AppError::RedisError(e)
            })?;

        let window = Duration::from_millis(config.throttle.window_ms);
        let throttle: Arc<dyn OrderThrottle> = if config.throttle.shared {
            Arc::new(RedisOrderThrottle::new(&redis, window).await?)
        } else {
            tracing::warn!("Using process-local order throttle");
            Arc::new(LocalOrderThrottle::new(window)?)
        };

        let razorpay = RazorpayClient::new(config.razorpay.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        if razorpay.is_configured() {
            tracing::info!("Razorpay client initialized");
        } else {
            tracing::warn!(
                "Razorpay credentials not configured - payment features will be limited"
            );
        }

        let signature_config = SignatureConfig {
            require_signatures: config.signature.enabled,
            excluded_paths: vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/metrics".to_string(),
                "/payment/webhook".to_string(), // Razorpay, not the BFF
            ],
        };

        let state = AppState {
            repository: Arc::new(db),
            gateway: Arc::new(razorpay),
            throttle,
            verifier: SignatureVerifier::from_config(&config.razorpay),
            signature_config,
            signing_client_id: config.signature.client_id.clone(),
            signing_secret: config.signature.secret.clone(),
            redis: Some(redis),
        };

        // Port 0 binds a random port for testing
        let address = config.common.bind_address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Commerce service listening");

        Ok(Self {
            port,
            listener,
            router: router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}
