//! Razorpay gateway adapter.
//!
//! Orders API for checkout, Refunds API for cancellations, and HMAC
//! verification for checkout callbacks and webhooks.

use crate::config::RazorpayConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::utils::signature::verify_hmac_hex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Razorpay credentials not configured")]
    NotConfigured,

    #[error("Razorpay error: {code} - {description}")]
    Api {
        status: u16,
        code: String,
        description: String,
    },

    #[error("Razorpay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected Razorpay response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl GatewayError {
    /// Provider-supplied description, safe to show to the user.
    pub fn description(&self) -> Option<&str> {
        match self {
            GatewayError::Api { description, .. } if !description.is_empty() => {
                Some(description.as_str())
            }
            _ => None,
        }
    }
}

/// Notes attached to an order; Razorpay only stores string values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderNotes {
    pub plan_id: String,
    pub user_id: String,
    pub is_installment: String,
    pub payment_mode: String,
    pub installment_index: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Amount in paise.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: OrderNotes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefundNotes {
    pub reason: String,
    pub subscription_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub speed: String,
    pub notes: RefundNotes,
}

/// Refund state as reported by Razorpay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    Processed,
    Pending,
    Failed,
}

impl RefundStatus {
    pub fn from_string(s: &str) -> Self {
        match s {
            "processed" => RefundStatus::Processed,
            "pending" => RefundStatus::Pending,
            _ => RefundStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayRefund {
    pub id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    pub status: String,
}

impl RazorpayRefund {
    pub fn status(&self) -> RefundStatus {
        RefundStatus::from_string(&self.status)
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key id handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &CreateOrderRequest)
        -> Result<RazorpayOrder, GatewayError>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<RazorpayRefund, GatewayError>;
}

/// Razorpay REST client.
#[derive(Clone)]
pub struct RazorpayClient {
    client: Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Razorpay response");

        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        let detail = serde_json::from_str::<RazorpayErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(RazorpayErrorDetail {
                code: "UNKNOWN".to_string(),
                description: String::new(),
            });

        tracing::error!(
            status = status.as_u16(),
            code = %detail.code,
            description = %detail.description,
            path = %path,
            "Razorpay request failed"
        );

        Err(GatewayError::Api {
            status: status.as_u16(),
            code: detail.code,
            description: detail.description,
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<RazorpayOrder, GatewayError> {
        let order: RazorpayOrder = self.post("/orders", request).await?;
        tracing::info!(
            order_id = %order.id,
            amount = order.amount,
            currency = %order.currency,
            "Razorpay order created"
        );
        Ok(order)
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<RazorpayRefund, GatewayError> {
        let refund: RazorpayRefund = self
            .post(&format!("/payments/{}/refund", payment_id), request)
            .await?;
        tracing::info!(
            refund_id = %refund.id,
            payment_id = %payment_id,
            status = %refund.status,
            "Razorpay refund requested"
        );
        Ok(refund)
    }
}

/// HMAC checks for checkout callbacks and webhooks.
#[derive(Clone)]
pub struct SignatureVerifier {
    key_secret: Secret<String>,
    webhook_secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(key_secret: Secret<String>, webhook_secret: Secret<String>) -> Self {
        Self {
            key_secret,
            webhook_secret,
        }
    }

    pub fn from_config(config: &RazorpayConfig) -> Self {
        Self::new(config.key_secret.clone(), config.webhook_secret.clone())
    }

    /// `HMAC-SHA256(order_id + "|" + payment_id, key_secret)`
    pub fn verify_payment(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let secret = self.key_secret.expose_secret();
        if secret.is_empty() {
            return false;
        }
        let payload = format!("{}|{}", order_id, payment_id);
        verify_hmac_hex(secret.as_bytes(), payload.as_bytes(), signature).unwrap_or(false)
    }

    pub fn webhook_secret_configured(&self) -> bool {
        !self.webhook_secret.expose_secret().is_empty()
    }

    /// `HMAC-SHA256(raw_body, webhook_secret)`
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> bool {
        if !self.webhook_secret_configured() {
            return false;
        }
        verify_hmac_hex(
            self.webhook_secret.expose_secret().as_bytes(),
            body,
            signature,
        )
        .unwrap_or(false)
    }
}

/// Webhook envelope. Only the entities this service reacts to are modelled.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<EntityEnvelope<WebhookPayment>>,
    #[serde(default)]
    pub refund: Option<EntityEnvelope<WebhookRefund>>,
}

#[derive(Debug, Deserialize)]
pub struct EntityEnvelope<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRefund {
    pub id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Razorpay sends `[]` for empty notes, so this stays untyped.
    #[serde(default)]
    pub notes: serde_json::Value,
}

impl WebhookRefund {
    pub fn subscription_id(&self) -> Option<&str> {
        self.notes.get("subscriptionId").and_then(|v| v.as_str())
    }
}
