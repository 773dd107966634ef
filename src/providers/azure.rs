use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::debug;

use super::{DestinationApi, UploadedAttachment};
use crate::config::DestinationConfig;
use crate::error::MigrateError;
use crate::model::mapping::WorkItemType;
use crate::model::patch::PatchDocument;

const JSON_PATCH: &str = "application/json-patch+json";
const OCTET_STREAM: &str = "application/octet-stream";

pub struct AzureClient {
    project_url: String,
    api_version: String,
    auth_header: String,
    client: reqwest::Client,
}

impl AzureClient {
    pub fn new(config: &DestinationConfig) -> Self {
        // Personal access tokens go in the password half with an empty user.
        let creds = format!(":{}", config.token);
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        Self {
            project_url: format!(
                "{}/{}/{}",
                config.base_url.trim_end_matches('/'),
                urlencoding::encode(&config.organization),
                urlencoding::encode(&config.project)
            ),
            api_version: config.api_version.clone(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
        }
    }

    fn address(&self, path: &str) -> String {
        format!("{}/_apis/wit{path}", self.project_url)
    }

    fn query(&self, bypass_rules: bool) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(2);
        if bypass_rules {
            query.push(("bypassRules", "true".to_string()));
        }
        query.push(("api-version", self.api_version.clone()));
        query
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await
            .context("Azure DevOps request failed")?;

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

#[derive(Deserialize)]
struct CreatedWorkItem {
    id: serde_json::Value,
}

#[derive(Deserialize)]
struct AttachmentReference {
    id: String,
    url: String,
}

#[async_trait]
impl DestinationApi for AzureClient {
    async fn create_work_item(&self, kind: WorkItemType, patch: &PatchDocument) -> Result<String> {
        let url = self.address(&format!("/workitems/${}", urlencoding::encode(kind.as_str())));
        debug!(url = %url, operations = patch.operations().len(), "POST");
        let request = self
            .client
            .post(&url)
            .query(&self.query(true))
            .header(CONTENT_TYPE, JSON_PATCH)
            .body(serde_json::to_vec(patch)?);

        let created: CreatedWorkItem = self
            .send(request)
            .await?
            .json()
            .await
            .context("Failed to parse created work item")?;

        match created.id {
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) if !s.is_empty() => Ok(s),
            _ => Err(MigrateError::MissingField("id").into()),
        }
    }

    async fn update_work_item(
        &self,
        id: &str,
        patch: &PatchDocument,
        bypass_rules: bool,
    ) -> Result<()> {
        let url = self.address(&format!("/workitems/{id}"));
        debug!(url = %url, bypass_rules, operations = patch.operations().len(), "PATCH");
        let request = self
            .client
            .patch(&url)
            .query(&self.query(bypass_rules))
            .header(CONTENT_TYPE, JSON_PATCH)
            .body(serde_json::to_vec(patch)?);
        self.send(request).await?;
        Ok(())
    }

    async fn upload_attachment(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedAttachment> {
        let url = self.address("/attachments");
        debug!(url = %url, file_name, size = bytes.len(), "POST");
        let mut query = vec![("fileName", file_name.to_string())];
        query.extend(self.query(false));
        let request = self
            .client
            .post(&url)
            .query(&query)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(bytes);

        let reference: AttachmentReference = self
            .send(request)
            .await?
            .json()
            .await
            .context("Failed to parse attachment reference")?;
        Ok(UploadedAttachment {
            id: reference.id,
            url: reference.url,
        })
    }

    fn work_item_url(&self, id: &str) -> String {
        self.address(&format!("/workItems/{id}"))
    }
}
