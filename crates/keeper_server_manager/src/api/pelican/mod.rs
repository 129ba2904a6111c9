use crate::api::models::{DetailsAttributes, Envelope, ListEnvelope};
use crate::api::{ApiProvider, PowerSignal, ServerDetails, ServerResources, ServerSummary};
use crate::error::ServerManagerError;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_LIST_PAGES: u32 = 100;

/// Pelican panel client. Listing uses the application API key, everything
/// else the client API key.
#[derive(Debug, Clone)]
pub struct PelicanClient {
    client: Client,
    base_url: String,
    client_token: String,
    application_token: String,
}

impl PelicanClient {
    pub fn new(base_url: &str, client_token: &str, application_token: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        PelicanClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_token: client_token.to_string(),
            application_token: application_token.to_string(),
        }
    }

    fn with_headers(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
    }

    async fn check(response: Response) -> Result<Response, ServerManagerError> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServerManagerError::ApiError(format!(
                "API error ({}): {}",
                status, text
            )));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, ServerManagerError> {
        let response = self
            .with_headers(self.client.get(url), token)
            .send()
            .await
            .map_err(|e| ServerManagerError::ApiError(format!("Request to {} failed: {}", url, e)))?;
        let body = Self::check(response).await?.text().await?;

        if body.trim().is_empty() {
            return Err(ServerManagerError::ParseError(format!(
                "Empty response from {}",
                url
            )));
        }
        serde_json::from_str(&body).map_err(|e| {
            ServerManagerError::ParseError(format!("Failed to parse response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl ApiProvider for PelicanClient {
    #[instrument(name = "pelican: list_servers", skip(self))]
    async fn list_servers(&self) -> Result<Vec<ServerSummary>, ServerManagerError> {
        let mut servers = Vec::new();
        let mut page = 1;

        loop {
            let url = format!("{}/api/application/servers?page={}", self.base_url, page);
            let list: ListEnvelope<ServerSummary> =
                self.get_json(&url, &self.application_token).await?;
            servers.extend(list.data.into_iter().map(|e| e.attributes));

            match list.meta {
                Some(meta)
                    if meta.pagination.current_page < meta.pagination.total_pages
                        && page < MAX_LIST_PAGES =>
                {
                    page += 1;
                }
                _ => break,
            }
        }

        debug!("Panel returned {} servers", servers.len());
        Ok(servers)
    }

    async fn get_server_resources(
        &self,
        server_id: &str,
    ) -> Result<ServerResources, ServerManagerError> {
        let url = format!(
            "{}/api/client/servers/{}/resources",
            self.base_url, server_id
        );
        let envelope: Envelope<ServerResources> = self.get_json(&url, &self.client_token).await?;
        Ok(envelope.attributes)
    }

    async fn get_server_details(
        &self,
        server_id: &str,
    ) -> Result<ServerDetails, ServerManagerError> {
        let url = format!(
            "{}/api/client/servers/{}?include=allocations,variables",
            self.base_url, server_id
        );
        let envelope: Envelope<DetailsAttributes> =
            self.get_json(&url, &self.client_token).await?;
        Ok(ServerDetails::from(envelope.attributes))
    }

    #[instrument(name = "pelican: power", skip(self), fields(signal = signal.as_str()))]
    async fn send_power_signal(
        &self,
        server_id: &str,
        signal: PowerSignal,
    ) -> Result<(), ServerManagerError> {
        let url = format!("{}/api/client/servers/{}/power", self.base_url, server_id);

        let response = self
            .with_headers(self.client.post(&url), &self.client_token)
            .json(&serde_json::json!({"signal": signal.as_str()}))
            .send()
            .await
            .map_err(|e| {
                ServerManagerError::ApiError(format!(
                    "Failed to send {} to server: {}",
                    signal.as_str(),
                    e
                ))
            })?;

        Self::check(response).await?;
        Ok(())
    }
}
