// ABOUTME: Typed client for the Caddy admin HTTP API.
// ABOUTME: AdminApi capability trait plus the reqwest implementation.

use super::SERVER_NAME;
use super::types::{AdminConfig, Route};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "http://localhost:2019";

#[derive(Debug, thiserror::Error)]
pub enum CaddyError {
    #[error("admin request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("admin returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("admin payload malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("caddy admin did not become ready")]
    NotReady,

    #[error("multiple caddy containers")]
    MultipleContainers,
}

/// The slice of the admin API the engine depends on.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Fetch the full configuration document.
    async fn get_config(&self) -> Result<AdminConfig, CaddyError>;

    /// Replace the full configuration document.
    async fn post_config(&self, config: &AdminConfig) -> Result<(), CaddyError>;

    /// Fetch the managed server's route list.
    async fn get_routes(&self) -> Result<Vec<Route>, CaddyError>;

    /// Replace the managed server's route list in a single write.
    async fn patch_routes(&self, routes: &[Route]) -> Result<(), CaddyError>;
}

/// reqwest-backed admin client.
#[derive(Debug, Clone)]
pub struct AdminClient {
    client: reqwest::Client,
    base_url: String,
}

impl AdminClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at a non-default admin endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn routes_path() -> String {
        format!("config/apps/http/servers/{}/routes", SERVER_NAME)
    }

    async fn do_request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, CaddyError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, method = %method, "making request to caddy");

        let mut request = self
            .client
            .request(method, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let data = response.text().await?;
        debug!(status = status.as_u16(), body = %data, "response from caddy");

        if !status.is_success() {
            return Err(CaddyError::UnexpectedStatus {
                status: status.as_u16(),
                body: data,
            });
        }

        if data.is_empty() {
            // Write endpoints reply with an empty body.
            return Ok(serde_json::from_str("null")?);
        }

        Ok(serde_json::from_str(&data)?)
    }
}

impl Default for AdminClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdminApi for AdminClient {
    async fn get_config(&self) -> Result<AdminConfig, CaddyError> {
        let config: Option<AdminConfig> = self
            .do_request::<(), _>(reqwest::Method::GET, "config/", None)
            .await?;
        // A fresh caddy reports "null" until a config is loaded.
        Ok(config.unwrap_or_default())
    }

    async fn post_config(&self, config: &AdminConfig) -> Result<(), CaddyError> {
        let _: Option<serde_json::Value> = self
            .do_request(reqwest::Method::POST, "config/", Some(config))
            .await?;
        Ok(())
    }

    async fn get_routes(&self) -> Result<Vec<Route>, CaddyError> {
        let routes: Option<Vec<Route>> = self
            .do_request::<(), _>(reqwest::Method::GET, &Self::routes_path(), None)
            .await?;
        Ok(routes.unwrap_or_default())
    }

    async fn patch_routes(&self, routes: &[Route]) -> Result<(), CaddyError> {
        let _: Option<serde_json::Value> = self
            .do_request(reqwest::Method::PATCH, &Self::routes_path(), Some(&routes))
            .await?;
        Ok(())
    }
}
