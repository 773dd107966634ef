use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::item::SourceItem;
use crate::config::SourceConfig;
use crate::error::MigrateError;
use crate::providers::SourceApi;

/// Lists a project's issues and dumps each one to disk.
pub struct Importer {
    api: Box<dyn SourceApi>,
    project: String,
    page_size: usize,
    dump_dir: PathBuf,
    subproject_field: String,
    pub issues: Vec<String>,
}

impl Importer {
    pub fn new(api: Box<dyn SourceApi>, config: &SourceConfig) -> Self {
        Self {
            api,
            project: config.project.clone(),
            page_size: config.page_size.max(1),
            dump_dir: config.dump_dir.clone(),
            subproject_field: config.subproject_field.clone(),
            issues: Vec::new(),
        }
    }

    /// Seed the importer with known identifiers instead of listing.
    pub fn with_issues(mut self, ids: Vec<String>) -> Self {
        self.issues = ids;
        self
    }

    /// Page through the project's issues (all statuses) until the reported
    /// total or `limit` is reached. A failed or malformed page aborts the
    /// listing.
    pub async fn list_issues(&mut self, limit: Option<usize>) -> bool {
        let limit = limit.unwrap_or(usize::MAX);
        match self.try_list(limit).await {
            Ok(()) => true,
            Err(e) => {
                error!(project = %self.project, offset = self.issues.len(), error = %e, "cannot list issues");
                false
            }
        }
    }

    async fn try_list(&mut self, limit: usize) -> Result<()> {
        let path = format!("/projects/{}/issues.json", self.project);
        while self.issues.len() < limit {
            let offset = self.issues.len();
            let page_limit = (limit - offset).min(self.page_size);
            let page = self
                .api
                .get_json(
                    &path,
                    &[
                        ("status_id", "*".into()),
                        ("limit", page_limit.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;

            let listed = page
                .get("issues")
                .and_then(Value::as_array)
                .ok_or(MigrateError::MissingField("issues"))?;
            let total = page
                .get("total_count")
                .and_then(Value::as_u64)
                .ok_or(MigrateError::MissingField("total_count"))?;
            for issue in listed {
                let id = issue
                    .get("id")
                    .and_then(id_string)
                    .ok_or(MigrateError::MissingField("issues[].id"))?;
                self.issues.push(id);
            }
            self.issues.truncate(limit);
            info!(collected = self.issues.len(), total, "listed page");

            let total = usize::try_from(total).unwrap_or(usize::MAX);
            if self.issues.len() >= total {
                break;
            }
            if self.issues.len() == offset {
                warn!(offset, total, "empty page before reaching total, stopping");
                break;
            }
        }
        Ok(())
    }

    /// Dump every listed issue. One issue failing does not stop the rest.
    /// Returns how many issues were dumped.
    pub async fn dump(&self) -> usize {
        let mut dumped = 0;
        for (idx, id) in self.issues.iter().enumerate() {
            let mut item = SourceItem::new(id.clone());
            if item
                .dump(self.api.as_ref(), &self.dump_dir, &self.subproject_field)
                .await
            {
                dumped += 1;
            }
            info!(issue = %id, "finished #{} of {}", idx + 1, self.issues.len());
        }
        dumped
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
