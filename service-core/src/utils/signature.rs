use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compare a received hex digest against the expected one in constant time.
/// Length mismatch returns false without comparing.
pub fn verify_hmac_hex(
    secret: &[u8],
    payload: &[u8],
    received: &str,
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256_hex(secret, payload)?;
    Ok(constant_time_eq(expected.as_bytes(), received.as_bytes()))
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Signature the BFF attaches to each request.
///
/// Format: HMAC-SHA256(method|path|timestamp|nonce|sha256(body), secret)
pub fn generate_request_signature(
    secret: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
) -> Result<String, anyhow::Error> {
    let body_hash = hex::encode(Sha256::digest(body));
    let payload = format!("{}|{}|{}|{}|{}", method, path, timestamp, nonce, body_hash);
    hmac_sha256_hex(secret.as_bytes(), payload.as_bytes())
}

pub fn verify_request_signature(
    secret: &str,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected = generate_request_signature(secret, method, path, timestamp, nonce, body)?;
    Ok(constant_time_eq(expected.as_bytes(), signature.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2
    #[test]
    fn hmac_matches_known_vector() {
        let digest = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            digest,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verify_rejects_truncated_digest() {
        let digest = hmac_sha256_hex(b"secret", b"order_1|pay_1").unwrap();
        assert!(verify_hmac_hex(b"secret", b"order_1|pay_1", &digest).unwrap());
        assert!(!verify_hmac_hex(b"secret", b"order_1|pay_1", &digest[..10]).unwrap());
        assert!(!verify_hmac_hex(b"other", b"order_1|pay_1", &digest).unwrap());
    }

    #[test]
    fn request_signature_round_trip() {
        let body = br#"{"planId":"p1"}"#;
        let signature =
            generate_request_signature("bff_secret", "POST", "/orders", 1_700_000_000, "n1", body)
                .unwrap();

        assert!(
            verify_request_signature(
                "bff_secret",
                "POST",
                "/orders",
                1_700_000_000,
                "n1",
                body,
                &signature
            )
            .unwrap()
        );
    }

    #[test]
    fn request_signature_detects_tampered_body() {
        let signature = generate_request_signature(
            "bff_secret",
            "POST",
            "/orders",
            1_700_000_000,
            "n1",
            br#"{"planId":"p1"}"#,
        )
        .unwrap();

        assert!(
            !verify_request_signature(
                "bff_secret",
                "POST",
                "/orders",
                1_700_000_000,
                "n1",
                br#"{"planId":"p2"}"#,
                &signature
            )
            .unwrap()
        );
    }
}
