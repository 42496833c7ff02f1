use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::EditorConfig;
use crate::error::EditorError;

/// Read-only copy of the document, used when the bridge can't deliver one.
#[async_trait]
pub trait StaticSource: Send + Sync {
    async fn fetch_document(&self) -> Result<String, EditorError>;
}

/// Fetches the webroot copy over HTTP.
pub struct HttpSource {
    http: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, document_name: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/{}", base_url.trim_end_matches('/'), document_name),
        }
    }

    pub fn from_config(config: &EditorConfig) -> Option<Self> {
        config
            .static_base_url
            .as_deref()
            .map(|base| Self::new(base, &config.document_name))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    // Millisecond query parameter so intermediate caches never serve a stale copy.
    fn cache_busted_url(&self) -> String {
        format!("{}?_={}", self.url, Utc::now().timestamp_millis())
    }
}

#[async_trait]
impl StaticSource for HttpSource {
    async fn fetch_document(&self) -> Result<String, EditorError> {
        let url = self.cache_busted_url();
        debug!(%url, "fetching static document");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EditorError::FetchFailed {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EditorError::FetchFailed {
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        let text = response.text().await.map_err(|e| EditorError::FetchFailed {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;
        info!(bytes = text.len(), url = %self.url, "static document fetched");
        Ok(text)
    }
}
