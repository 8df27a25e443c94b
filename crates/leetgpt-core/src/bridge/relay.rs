use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::{RelayRequest, RelayResponse};

/// Forwards one completion request to the configured endpoint.
///
/// The relay never interprets API-level errors: a finished HTTP exchange is
/// handed back as-is, whatever the status. Only a transport failure (no
/// response, or a body that isn't JSON) is turned into a synthetic 500.
#[derive(Clone)]
pub struct Relay {
    client: Client,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub async fn relay(&self, request: RelayRequest) -> RelayResponse {
        match self.send(&request).await {
            Ok((status, data)) => {
                debug!(status, "completion exchange finished");
                RelayResponse { status, data }
            }
            Err(e) => {
                warn!(endpoint = %request.config.endpoint, error = %e, "relay transport failure");
                RelayResponse::transport_failure(e.to_string())
            }
        }
    }

    async fn send(&self, request: &RelayRequest) -> reqwest::Result<(u16, Value)> {
        let response = self
            .client
            .post(&request.config.endpoint)
            .header("Authorization", format!("Bearer {}", request.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let data: Value = response.json().await?;
        Ok((status, data))
    }
}
