pub mod azure;
pub mod redmine;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::mapping::WorkItemType;
use crate::model::patch::PatchDocument;

/// Read access to the ticket system being migrated away from.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value>;
    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<String>;
    /// Fetch raw bytes from an absolute URL on the source server.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// An attachment stored on the destination side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAttachment {
    pub id: String,
    pub url: String,
}

/// Write access to the work item API being migrated into.
#[async_trait]
pub trait DestinationApi: Send + Sync {
    /// Create a work item and return its new identifier.
    async fn create_work_item(&self, kind: WorkItemType, patch: &PatchDocument) -> Result<String>;
    async fn update_work_item(&self, id: &str, patch: &PatchDocument, bypass_rules: bool)
        -> Result<()>;
    async fn upload_attachment(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadedAttachment>;
    /// URL other work items use to link to `id`.
    fn work_item_url(&self, id: &str) -> String;
}
