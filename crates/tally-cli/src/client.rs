//! HTTP client for the sync API.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_core::sync::{CommandsResponse, FirstSyncRequest, SnapshotResponse, SyncRequest};
use tally_core::util::normalize_text_option;
use tally_core::Command;

use crate::error::CliError;

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Result<Self, CliError> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            access_token: normalize_text_option(access_token),
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<Value, CliError> {
        let response = self
            .client
            .get(format!("{}/healthz", self.base_url))
            .header("Accept", "application/json")
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn push(&self, commands: Vec<Command>) -> Result<CommandsResponse, CliError> {
        let request = SyncRequest {
            commands: Some(commands),
            ..SyncRequest::default()
        };
        self.post("/v1/sync", &request).await
    }

    /// Pull a snapshot (`*`) or the changes since `token`; the envelope
    /// differs between the two so it is returned untyped.
    pub async fn pull(&self, token: &str, resource_types: Vec<String>) -> Result<Value, CliError> {
        let request = SyncRequest {
            sync_token: Some(token.to_string()),
            resource_types: (!resource_types.is_empty())
                .then_some(tally_core::sync::ResourceSelection::Many(resource_types)),
            ..SyncRequest::default()
        };
        self.post("/v1/sync", &request).await
    }

    pub async fn first_sync(&self, request: &FirstSyncRequest) -> Result<SnapshotResponse, CliError> {
        self.post("/v1/sync/first", request).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CliError> {
        let token = self
            .access_token
            .as_deref()
            .ok_or(CliError::MissingAccessToken)?;

        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), "API request failed");
        return Err(CliError::Api(parse_api_error(status, &body)));
    }
    Ok(response.json::<T>().await?)
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

pub(crate) fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

pub(crate) fn normalize_base_url(raw: String) -> Result<String, CliError> {
    let url = normalize_text_option(Some(raw))
        .ok_or_else(|| CliError::Config("API URL must not be empty".to_string()))?;
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(CliError::Config(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}
