// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! JWT bearer-token authentication middleware and per-IP rate limiting.
//!
//! # Token authentication
//!
//! Mutating and session-scoped routes require:
//! ```text
//! Authorization: Bearer <jwt>
//! ```
//! The token is HS256-signed with the shared secret from
//! [`osa_config::GatewayConfig::jwt_secret`]; required claims are
//! `user_id`, `iat`, `exp`. Verification happens through
//! [`crate::jwt::verify`], which rejects an expired token and an
//! unrecognised issuer.
//!
//! # Rate limiting
//!
//! Uses the `governor` crate (GCRA algorithm) for per-IP rate limiting.
//! Only failed authentication attempts consume a rate-limit token; 5
//! failures per minute (burst 2) triggers a lockout. Loopback addresses
//! are exempt — a local process with loopback access already has local
//! access to the machine.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use tracing::warn;

use crate::jwt;

type IpLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Shared auth state threaded through axum middleware.
#[derive(Clone)]
pub struct AuthState {
    secret: Arc<String>,
    limiter: Arc<IpLimiter>,
}

impl AuthState {
    /// `max_per_minute`: maximum failed auth attempts before lockout.
    /// `burst`: how many attempts are allowed in a burst before the limit
    /// kicks in.
    pub fn new(secret: impl Into<String>, max_per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(max_per_minute).expect("max_per_minute must be > 0"))
            .allow_burst(NonZeroU32::new(burst).expect("burst must be > 0"));
        Self {
            secret: Arc::new(secret.into()),
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }

    /// Default configuration: 5 attempts per minute, burst of 2.
    pub fn with_defaults(secret: impl Into<String>) -> Self {
        Self::new(secret, 5, 2)
    }
}

/// Trait for state types that carry auth info.
pub trait AsAuthState {
    fn auth_state(&self) -> &AuthState;
}

impl AsAuthState for AuthState {
    fn auth_state(&self) -> &AuthState {
        self
    }
}

/// Axum middleware verifying the bearer JWT. Extracted `user_id` is
/// inserted into request extensions for downstream handlers.
pub async fn bearer_auth_mw<S>(
    State(state): State<S>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request,
    next: Next,
) -> Response
where
    S: AsAuthState + Clone + Send + Sync + 'static,
{
    let auth = state.auth_state();
    match verify_request(auth, addr.ip(), req.headers()) {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthenticatedUser(user_id));
            next.run(req).await
        }
        Err(resp) => resp,
    }
}

/// Inserted into request extensions by [`bearer_auth_mw`] on success.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

fn verify_request(auth: &AuthState, ip: IpAddr, headers: &HeaderMap) -> Result<String, Response> {
    let token = extract_bearer(headers);
    match token.and_then(|t| jwt::verify(&auth.secret, t).ok()) {
        Some(claims) => Ok(claims.user_id),
        None => {
            if !is_loopback(ip) && auth.limiter.check_key(&ip).is_err() {
                warn!(%ip, "rate limit exceeded after repeated auth failures");
                return Err((
                    StatusCode::TOO_MANY_REQUESTS,
                    [(axum::http::header::RETRY_AFTER, "60")],
                    "Too Many Requests",
                )
                    .into_response());
            }
            warn!(%ip, "authentication failed");
            Err((StatusCode::UNAUTHORIZED, "Unauthorized").into_response())
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => v6.is_loopback(),
    }
}
