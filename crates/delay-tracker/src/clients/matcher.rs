// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the journey matcher.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use super::{normalize_base_url, JourneyWithSegments, MatcherApi};
use crate::error::{Error, Result};

/// Reqwest-backed journey matcher client.
pub struct MatcherClient {
    client: reqwest::Client,
    base_url: String,
}

impl MatcherClient {
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
impl MatcherApi for MatcherClient {
    async fn journey_segments(&self, journey_id: &str) -> Result<Option<JourneyWithSegments>> {
        let url = format!("{}/api/v1/journeys/{}/segments", self.base_url, journey_id);
        debug!(journey_id = %journey_id, "Querying journey matcher");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Matcher("Journey Matcher API request timeout".to_string())
            } else {
                Error::Matcher(format!("Journey Matcher API request failed: {}", e))
            }
        })?;

        // An unknown journey is a normal answer, not a failure.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Matcher(format!(
                "Journey Matcher API error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }

        let journey: JourneyWithSegments = response
            .json()
            .await
            .map_err(|e| Error::Matcher(format!("Invalid matcher response: {}", e)))?;

        Ok(Some(journey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_journey_segments() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/journeys/JRN-1/segments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "JRN-1",
                "user_id": "U1",
                "origin_crs": "KGX",
                "destination_crs": "EDB",
                "travel_date": "2026-01-20",
                "status": "matched",
                "segments": [{
                    "id": "seg-1",
                    "journey_id": "JRN-1",
                    "sequence": 1,
                    "rid": "202601200800999",
                    "origin_crs": "KGX",
                    "destination_crs": "EDB",
                    "scheduled_departure": "2026-01-20T08:00:00Z",
                    "scheduled_arrival": "2026-01-20T12:30:00Z",
                    "toc_code": "GR"
                }]
            })))
            .mount(&mock_server)
            .await;

        let client =
            MatcherClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let journey = client
            .journey_segments("JRN-1")
            .await
            .unwrap()
            .expect("journey should be matched");

        assert_eq!(journey.first_rid(), Some("202601200800999"));
        assert!(journey.all_segments_have_rids());
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/journeys/JRN-404/segments"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client =
            MatcherClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let journey = client.journey_segments("JRN-404").await.unwrap();
        assert!(journey.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/v1/journeys/JRN-1/segments"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client =
            MatcherClient::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.journey_segments("JRN-1").await.unwrap_err();
        assert!(err.to_string().contains("Journey Matcher API error: 500"));
    }
}
