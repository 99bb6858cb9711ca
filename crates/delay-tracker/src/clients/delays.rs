// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the upstream real-time delays feed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{normalize_base_url, DelaysApi, ServiceDelay};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct DelayQueryRequest<'a> {
    rids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct DelayQueryResponse {
    services: Vec<ServiceDelay>,
}

/// Reqwest-backed delays feed client.
pub struct DelaysClient {
    client: reqwest::Client,
    base_url: String,
}

impl DelaysClient {
    /// Create a client for the given base URL with a request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }
}

#[async_trait]
impl DelaysApi for DelaysClient {
    async fn fetch_delays(&self, rids: &[String]) -> Result<Vec<ServiceDelay>> {
        if rids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/v1/delays", self.base_url);
        debug!(rid_count = rids.len(), "Querying upstream delays");

        let response = self
            .client
            .post(&url)
            .json(&DelayQueryRequest { rids })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Upstream("Upstream API request timeout".to_string())
                } else {
                    Error::Upstream(format!("Upstream API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "Upstream API error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        let body: DelayQueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Invalid upstream response: {}", e)))?;

        Ok(body.services)
    }
}
