// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! HS256 JWT issuance and verification.
//!
//! Required claims: `user_id`, `iat`, `exp`; a token is rejected once `now
//! >= exp`. Local-mode issuer is `osa` (`miosa-sdk` is also accepted, for
//! interop with the upstream SDK's own token minting). Default TTL is
//! 900s (15 min).

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TTL_SECS: u64 = 900;
pub const LOCAL_ISSUER: &str = "osa";
const ACCEPTED_ISSUERS: &[&str] = &["osa", "miosa-sdk"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub iss: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("missing or malformed Authorization header")]
    MissingToken,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token issuer not recognised")]
    UnknownIssuer,
}

/// Mint a token for `user_id`, valid for `ttl_secs` from now.
pub fn issue(secret: &str, user_id: &str, ttl_secs: u64) -> Result<String, JwtError> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id: user_id.to_string(),
        iat: now,
        exp: now + ttl_secs as i64,
        iss: Some(LOCAL_ISSUER.to_string()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

/// Verify a token's signature (constant-time, via `jsonwebtoken`'s HMAC
/// compare) and its `exp`/`iss` claims. `jsonwebtoken` itself rejects an
/// expired token; `validate_exp` stays enabled explicitly so that
/// intention is not implicit in a library default.
pub fn verify(secret: &str, token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "iat"]);
    // `iss` is checked manually below rather than via jsonwebtoken's builtin
    // issuer check, so that a token omitting it is still validated as long
    // as every other claim checks out — only a *wrong* issuer is rejected.
    validation.validate_aud = false;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    if let Some(iss) = &data.claims.iss {
        if !ACCEPTED_ISSUERS.contains(&iss.as_str()) {
            return Err(JwtError::UnknownIssuer);
        }
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_then_verify_round_trips() {
        let token = issue("s3cr3t", "alice", 900).unwrap();
        let claims = verify("s3cr3t", &token).unwrap();
        assert_eq!(claims.user_id, "alice");
        assert_eq!(claims.iss.as_deref(), Some("osa"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue("s3cr3t", "alice", 900).unwrap();
        assert!(verify("wrong-secret", &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue("s3cr3t", "alice", 0).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(matches!(verify("s3cr3t", &token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn unknown_issuer_is_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: "bob".into(),
            iat: now,
            exp: now + 900,
            iss: Some("some-other-issuer".into()),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cr3t"),
        )
        .unwrap();
        assert!(matches!(verify("s3cr3t", &token), Err(JwtError::UnknownIssuer)));
    }

    #[test]
    fn miosa_sdk_issuer_is_accepted() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            user_id: "carol".into(),
            iat: now,
            exp: now + 900,
            iss: Some("miosa-sdk".into()),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cr3t"),
        )
        .unwrap();
        assert!(verify("s3cr3t", &token).is_ok());
    }
}
