//! Unverified access token claim decoding.
//!
//! These checks only read the `exp` claim so callers can skip round trips
//! with a visibly expired token. The signature is NOT verified and no trust
//! decision may depend on the result.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use serde_json::Value;

use super::types::DecodedSessionClaims;

/// Number of dot-separated segments in a JWT (header.payload.signature)
const JWT_SEGMENT_COUNT: usize = 3;

/// Check whether a token is present, well formed, and not yet expired.
pub fn is_token_valid(token: Option<&str>) -> bool {
    is_token_valid_at(token, now_epoch_seconds())
}

/// Same as [`is_token_valid`] against an explicit clock.
pub fn is_token_valid_at(token: Option<&str>, now_epoch_seconds: f64) -> bool {
    match token.and_then(expiry_claim) {
        Some(exp) => exp > now_epoch_seconds,
        None => false,
    }
}

/// Decode the expiry claim of a token, or `None` if it cannot be read.
pub fn decode_claims(token: &str) -> Option<DecodedSessionClaims> {
    expiry_claim(token).map(|exp| DecodedSessionClaims {
        expires_at_epoch_seconds: exp.floor() as i64,
    })
}

fn expiry_claim(token: &str) -> Option<f64> {
    if token.is_empty() {
        return None;
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != JWT_SEGMENT_COUNT {
        return None;
    }

    let payload = decode_segment(segments[1])?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;
    claims.as_object()?.get("exp")?.as_f64()
}

/// JWTs use unpadded base64url, but tolerate padding and the standard alphabet.
fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

fn now_epoch_seconds() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
