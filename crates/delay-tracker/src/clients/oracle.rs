// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the compensation-claims oracle.
//!
//! This client is deliberately asymmetric to the other two: a non-2xx
//! response is returned as data so the claim trigger can classify business
//! failures, while timeouts and connection errors raise so they can be
//! treated as retryable incidents.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::{
    normalize_base_url, ClaimTriggerRequest, ClaimTriggerResponse, ClaimsApi, EligibilityRequest,
    EligibilityResponse,
};
use crate::error::{Error, Result};

/// Reqwest-backed claims oracle client.
pub struct OracleClient {
    client: reqwest::Client,
    base_url: String,
}

impl OracleClient {
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
impl ClaimsApi for OracleClient {
    async fn trigger_claim(&self, request: &ClaimTriggerRequest) -> Result<ClaimTriggerResponse> {
        let url = format!("{}/api/v1/claims/trigger", self.base_url);
        debug!(
            journey_id = %request.journey_id,
            delay_minutes = request.delay_minutes,
            "Triggering compensation claim"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::OracleNetwork("Claims API request timeout".to_string())
                } else {
                    Error::OracleNetwork(format!("Claims API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Ok(ClaimTriggerResponse {
                success: false,
                error: Some(format!(
                    "API error: {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )),
                message: if body.is_empty() { None } else { Some(body) },
                ..Default::default()
            });
        }

        let body: ClaimTriggerResponse = response
            .json()
            .await
            .map_err(|e| Error::OracleNetwork(format!("Invalid claims API response: {}", e)))?;

        Ok(body)
    }

    async fn check_eligibility(&self, request: &EligibilityRequest) -> Result<EligibilityResponse> {
        let url = format!("{}/api/v1/eligibility/check", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::OracleNetwork("Eligibility API request timeout".to_string())
                } else {
                    Error::OracleNetwork(format!("Eligibility API request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(EligibilityResponse {
                eligible: false,
                reason: Some(format!("API error: {}", status.as_u16())),
            });
        }

        let body: EligibilityResponse = response.json().await.map_err(|e| {
            Error::OracleNetwork(format!("Invalid eligibility API response: {}", e))
        })?;

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn trigger_request() -> ClaimTriggerRequest {
        ClaimTriggerRequest {
            delay_alert_id: "alert-1".to_string(),
            journey_id: "JRN-1".to_string(),
            user_id: "U1".to_string(),
            delay_minutes: 25,
            delay_reasons: None,
        }
    }

    #[tokio::test]
    async fn test_successful_trigger() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/claims/trigger"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "claim_reference_id": "C-001",
                "eligible": true,
                "estimated_compensation": 25.5
            })))
            .mount(&mock_server)
            .await;

        let client =
            OracleClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = client.trigger_claim(&trigger_request()).await.unwrap();

        assert!(response.success);
        assert_eq!(response.claim_reference_id.as_deref(), Some("C-001"));
        assert_eq!(response.estimated_compensation, Some(25.5));
    }

    #[tokio::test]
    async fn test_non_2xx_returns_error_shaped_response() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/claims/trigger"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oracle exploded"))
            .mount(&mock_server)
            .await;

        let client =
            OracleClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = client.trigger_claim(&trigger_request()).await.unwrap();

        assert!(!response.success);
        assert!(response.claim_reference_id.is_none());
        assert!(response
            .error
            .as_deref()
            .unwrap()
            .starts_with("API error: 500"));
        assert_eq!(response.message.as_deref(), Some("oracle exploded"));
    }

    #[tokio::test]
    async fn test_timeout_raises() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/claims/trigger"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let client =
            OracleClient::new(&mock_server.uri(), Duration::from_millis(100)).unwrap();
        let err = client.trigger_claim(&trigger_request()).await.unwrap_err();

        assert!(matches!(err, Error::OracleNetwork(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[tokio::test]
    async fn test_eligibility_check() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/eligibility/check"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "eligible": false,
                "reason": "journey outside compensation window"
            })))
            .mount(&mock_server)
            .await;

        let client =
            OracleClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = client
            .check_eligibility(&EligibilityRequest {
                user_id: "U1".to_string(),
                journey_id: "JRN-1".to_string(),
                delay_minutes: 25,
            })
            .await
            .unwrap();

        assert!(!response.eligible);
        assert!(response.reason.is_some());
    }

    #[tokio::test]
    async fn test_eligibility_non_2xx_is_ineligible() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/eligibility/check"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        let client =
            OracleClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let response = client
            .check_eligibility(&EligibilityRequest {
                user_id: "U1".to_string(),
                journey_id: "JRN-1".to_string(),
                delay_minutes: 25,
            })
            .await
            .unwrap();

        assert!(!response.eligible);
        assert_eq!(response.reason.as_deref(), Some("API error: 502"));
    }
}
