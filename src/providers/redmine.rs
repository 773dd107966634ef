use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::SourceApi;
use crate::config::SourceConfig;
use crate::error::MigrateError;

pub struct RedmineClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RedmineClient {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        debug!(url = %url, "GET");
        let resp = self
            .client
            .get(url)
            .header("X-Redmine-API-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Redmine request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MigrateError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(resp)
    }
}

#[async_trait]
impl SourceApi for RedmineClient {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        self.get(&url, query)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Redmine response from {path}"))
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        Ok(self.get(&url, query).await?.text().await?)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.get(url, &[]).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
