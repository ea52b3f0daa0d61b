// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Inbound webhook signature verification.
//!
//! Base string: `v0:<timestamp>:<raw_body>`. Signature: HMAC-SHA256 over
//! that string, hex-encoded, compared in constant time. Requests whose
//! `timestamp` claim is more than 5 minutes away from "now" (either
//! direction) are rejected as stale, independent of signature validity —
//! this bounds the window a captured signature can be replayed in.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const MAX_SKEW_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("timestamp is outside the allowed window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    BadSignature,
}

/// Compute the hex-encoded HMAC-SHA256 signature for `timestamp`/`body`.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let base = base_string(timestamp, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(&base);
    hex::encode(mac.finalize().into_bytes())
}

fn base_string(timestamp: i64, body: &[u8]) -> Vec<u8> {
    let mut base = format!("v0:{timestamp}:").into_bytes();
    base.extend_from_slice(body);
    base
}

/// Verify a webhook request's signature and freshness. `timestamp` is
/// already parsed by the caller from whatever header carries it.
pub fn verify(
    secret: &str,
    timestamp: i64,
    body: &[u8],
    provided_signature_hex: &str,
) -> Result<(), WebhookError> {
    let now = chrono::Utc::now().timestamp();
    if (now - timestamp).abs() > MAX_SKEW_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let expected = sign(secret, timestamp, body);
    let expected_bytes = expected.as_bytes();
    let provided_bytes = provided_signature_hex.as_bytes();

    let matches = expected_bytes.len() == provided_bytes.len()
        && bool::from(expected_bytes.ct_eq(provided_bytes));

    if matches {
        Ok(())
    } else {
        Err(WebhookError::BadSignature)
    }
}
