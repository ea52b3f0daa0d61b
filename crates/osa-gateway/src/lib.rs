// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP facade for the osa agent runtime: `POST /api/v1/orchestrate`, SSE
//! event streaming, `/api/v1/classify`, `/api/v1/memory`,
//! `/api/v1/machines`, and an unauthenticated `/health`. JWT HS256 auth and
//! HMAC-SHA256 webhook verification guard the mutating routes; security
//! headers and CSRF checks apply to all of them.

pub mod gateway;
pub mod http;
pub mod jwt;
pub mod webhook;

pub use gateway::{serve, GatewayState, HealthState};
