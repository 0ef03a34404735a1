//! HTTP client for the platform data API.

use super::{Page, SourceApi};
use crate::config::SourceConfig;
use crate::error::SourceError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const USER_AGENT: &str = concat!("sheet-migrator/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct Envelope {
    response: Page,
}

/// Bearer-authenticated client for `GET {base_url}/obj/{type}`.
pub struct HttpSource {
    http_client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        if config.base_url.is_empty() {
            return Err(SourceError::Api {
                status: 0,
                body: "source.base_url is not configured".into(),
            });
        }
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Transient(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, type_name: &str) -> String {
        format!("{}/obj/{}", self.base_url, type_name)
    }
}

#[async_trait]
impl SourceApi for HttpSource {
    async fn fetch_page(
        &self,
        type_name: &str,
        cursor: usize,
        limit: usize,
    ) -> Result<Page, SourceError> {
        let url = self.url(type_name);
        tracing::debug!(url = %url, cursor, limit, "Querying source API");

        let mut request = self
            .http_client
            .get(&url)
            .query(&[("cursor", cursor), ("limit", limit)]);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Transient(format!("{}: {}", status, body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(envelope.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_base_url() {
        let config = SourceConfig::default();
        assert!(HttpSource::new(&config).is_err());
    }

    #[test]
    fn builds_object_urls() {
        let config = SourceConfig {
            base_url: "https://legacy.example.com/api/1.1/".into(),
            ..SourceConfig::default()
        };
        let source = HttpSource::new(&config).unwrap();
        assert_eq!(
            source.url("listtablerow"),
            "https://legacy.example.com/api/1.1/obj/listtablerow"
        );
    }

    #[test]
    fn envelope_decodes_platform_shape() {
        let body = r#"{"response": {"cursor": 100, "results": [{"_id": "x"}], "remaining": 42, "count": 1}}"#;
        let envelope: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.response.cursor, 100);
        assert_eq!(envelope.response.remaining, 42);
        assert_eq!(envelope.response.results.len(), 1);
    }
}
