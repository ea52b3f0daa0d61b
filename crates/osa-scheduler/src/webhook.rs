// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Outbound webhook execution for the `webhook` job/trigger type.
//!
//! URLs are validated before every request: loopback, link-local, and
//! RFC1918 private addresses are rejected so a compromised or misconfigured
//! job cannot be used to probe internal services.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use url::{Host, Url};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Reject a URL that resolves (by literal host, not DNS) to loopback,
/// link-local, or private address space, or that doesn't use http(s).
pub fn validate_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url: {e}"))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{other}', expected http/https")),
    }
    match url.host() {
        Some(Host::Ipv4(ip)) => check_ipv4(ip)?,
        Some(Host::Ipv6(ip)) => check_ipv6(ip)?,
        Some(Host::Domain(domain)) => {
            if domain.eq_ignore_ascii_case("localhost") {
                return Err("blocked: localhost is not a valid webhook target".to_string());
            }
        }
        None => return Err("url has no host".to_string()),
    }
    Ok(url)
}

fn check_ipv4(ip: std::net::Ipv4Addr) -> Result<(), String> {
    if ip.is_loopback() || ip.is_link_local() || ip.is_private() || ip.is_unspecified() || ip.is_broadcast() {
        return Err(format!("blocked: webhook target {ip} is not a public address"));
    }
    Ok(())
}

fn check_ipv6(ip: std::net::Ipv6Addr) -> Result<(), String> {
    let is_unique_local = (ip.segments()[0] & 0xfe00) == 0xfc00;
    if ip.is_loopback() || ip.is_unspecified() || is_unique_local || is_ipv6_link_local(&ip) {
        return Err(format!("blocked: webhook target {ip} is not a public address"));
    }
    if let IpAddr::V6(v6) = IpAddr::V6(ip) {
        if let Some(v4) = v6.to_ipv4_mapped() {
            check_ipv4(v4)?;
        }
    }
    Ok(())
}

fn is_ipv6_link_local(ip: &std::net::Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// POST `body` to `url`. Returns the response status and a body capped to
/// 100KB, matching the scheduler's general output-size discipline.
pub async fn post(client: &Client, url: &Url, body: String) -> Result<(u16, String), String> {
    let resp = client
        .post(url.clone())
        .timeout(TIMEOUT)
        .body(body)
        .send()
        .await
        .map_err(|e| format!("webhook request failed: {e}"))?;
    let status = resp.status().as_u16();
    let text = resp
        .text()
        .await
        .map_err(|e| format!("webhook response read failed: {e}"))?;
    const CAP: usize = 100_000;
    let capped = if text.len() > CAP {
        text[..CAP].to_string()
    } else {
        text
    };
    Ok((status, capped))
}
