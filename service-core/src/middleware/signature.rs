use crate::error::AppError;
use crate::utils::signature::verify_request_signature;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;

pub const CLIENT_ID_HEADER: &str = "X-Client-ID";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const NONCE_HEADER: &str = "X-Nonce";
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Maximum clock skew accepted between the signer and this service.
pub const MAX_SKEW_SECONDS: i64 = 60;

#[derive(Clone, Debug, Default)]
pub struct SignatureConfig {
    pub require_signatures: bool,
    /// Path prefixes that bypass signing (health probes, provider webhooks).
    pub excluded_paths: Vec<String>,
}

impl SignatureConfig {
    fn is_excluded(&self, path: &str) -> bool {
        self.excluded_paths
            .iter()
            .any(|p| path == p || path.starts_with(p.as_str()))
    }
}

#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Returns false when the nonce was already seen inside the skew window.
    async fn validate_nonce(&self, nonce: &str) -> Result<bool, AppError>;
    async fn get_signing_secret(&self, client_id: &str) -> Result<Option<String>, AppError>;
}

struct SignedHeaders {
    client_id: String,
    timestamp: i64,
    nonce: String,
    signature: String,
}

/// Verifies the BFF request signature before the handler sees the request.
pub async fn signature_validation_middleware<S>(
    State(state): State<S>,
    req: Request,
    next: Next,
) -> Result<Response, AppError>
where
    S: AsRef<SignatureConfig> + SignatureStore + Clone + Send + Sync + 'static,
{
    let config = state.as_ref();

    if config.is_excluded(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    if !config.require_signatures && !req.headers().contains_key(SIGNATURE_HEADER) {
        return Ok(next.run(req).await);
    }

    let signed = extract_signed_headers(req.headers())?;

    let now = chrono::Utc::now().timestamp();
    if (now - signed.timestamp).abs() > MAX_SKEW_SECONDS {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Request timestamp expired"
        )));
    }

    if !state.validate_nonce(&signed.nonce).await? {
        tracing::warn!(
            security_event = true,
            client_id = %signed.client_id,
            "Replayed request nonce"
        );
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Replay detected (nonce used)"
        )));
    }

    let secret = state
        .get_signing_secret(&signed.client_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid Client ID")))?;

    let (parts, body) = req.into_parts();
    let bytes = body
        .collect()
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to read body: {}", e)))?
        .to_bytes();

    let is_valid = verify_request_signature(
        &secret,
        parts.method.as_str(),
        parts.uri.path(),
        signed.timestamp,
        &signed.nonce,
        &bytes,
        &signed.signature,
    )?;

    if !is_valid {
        tracing::warn!(
            security_event = true,
            client_id = %signed.client_id,
            path = %parts.uri.path(),
            "Request signature mismatch"
        );
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid signature")));
    }

    let req = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(req).await)
}

fn extract_signed_headers(headers: &HeaderMap) -> Result<SignedHeaders, AppError> {
    let timestamp = get_header(headers, TIMESTAMP_HEADER)?
        .parse()
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid timestamp format")))?;

    Ok(SignedHeaders {
        client_id: get_header(headers, CLIENT_ID_HEADER)?,
        timestamp,
        nonce: get_header(headers, NONCE_HEADER)?,
        signature: get_header(headers, SIGNATURE_HEADER)?,
    })
}

fn get_header(headers: &HeaderMap, key: &str) -> Result<String, AppError> {
    headers
        .get(key)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing header: {}", key)))?
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid header format: {}", key)))
}
