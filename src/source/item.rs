use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};

use super::html;
use crate::error::MigrateError;
use crate::model::snapshot::{
    contained_path, AttachmentRef, NoteRef, Snapshot, ATTACHMENTS_DIR, DESCRIPTION_FILE,
    HISTORY_DIR,
};
use crate::providers::SourceApi;

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct IdRef {
    id: u64,
}

#[derive(Deserialize)]
struct CustomField {
    name: String,
    #[serde(default)]
    value: Value,
}

#[derive(Deserialize)]
struct RelationRef {
    issue_id: u64,
    issue_to_id: u64,
}

#[derive(Deserialize)]
struct AttachmentEntry {
    id: u64,
    filename: String,
    content_url: String,
}

#[derive(Deserialize)]
struct Journal {
    id: u64,
    #[serde(default)]
    user: Option<Named>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    created_on: Option<String>,
}

/// Field lookups on one issue object; a missing or malformed field is logged
/// and read as its empty default.
struct Fields<'a> {
    id: &'a str,
    issue: &'a Value,
}

impl Fields<'_> {
    fn section<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(value) = self.issue.get(key) else {
            warn!(issue = self.id, field = key, "field missing, using empty value");
            return T::default();
        };
        serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            warn!(issue = self.id, field = key, error = %e, "malformed field, using empty value");
            T::default()
        })
    }

    fn text(&self, key: &str) -> String {
        self.section::<Option<String>>(key).unwrap_or_default()
    }

    fn name(&self, key: &str) -> String {
        self.section::<Option<Named>>(key)
            .map(|n| n.name)
            .unwrap_or_default()
    }

    fn custom_field(&self, field_name: &str) -> String {
        let fields: Vec<CustomField> = self.section("custom_fields");
        match fields.into_iter().find(|f| f.name == field_name) {
            Some(CustomField {
                value: Value::String(s),
                ..
            }) => s,
            Some(CustomField {
                value: Value::Null, ..
            }) => String::new(),
            Some(field) => field.value.to_string(),
            None => {
                warn!(issue = self.id, field = field_name, "no such custom field");
                String::new()
            }
        }
    }
}

/// One Redmine issue on its way to disk.
pub struct SourceItem {
    pub id: String,
    pub record: Snapshot,
    pub description: String,
    pub notes_content: BTreeMap<u64, String>,
}

impl SourceItem {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            record: Snapshot {
                id: id.clone(),
                ..Snapshot::default()
            },
            id,
            description: String::new(),
            notes_content: BTreeMap::new(),
        }
    }

    /// Fetch the issue's JSON detail and rendered page and merge them.
    pub async fn fill(&mut self, api: &dyn SourceApi, subproject_field: &str) -> bool {
        match self.try_fill(api, subproject_field).await {
            Ok(()) => true,
            Err(e) => {
                error!(issue = %self.id, error = %e, "cannot fill data");
                false
            }
        }
    }

    async fn try_fill(&mut self, api: &dyn SourceApi, subproject_field: &str) -> Result<()> {
        let detail = api
            .get_json(
                &format!("/issues/{}.json", self.id),
                &[("include", "relations,children,attachments,journals".into())],
            )
            .await?;
        let issue = detail.get("issue").ok_or(MigrateError::MissingField("issue"))?;
        self.record = self.parse_issue(issue, subproject_field);

        let page = api
            .get_text(
                &format!("/issues/{}.html", self.id),
                &[("include", "journals".into())],
            )
            .await?;
        self.description = html::description_block(&page).unwrap_or_else(|| {
            warn!(issue = %self.id, "no description block in rendered page");
            String::new()
        });

        let note_ids: Vec<u64> = self.record.notes.iter().map(|n| n.id).collect();
        self.notes_content = html::note_blocks(&page, &note_ids);
        for id in note_ids.iter().filter(|id| !self.notes_content.contains_key(id)) {
            warn!(issue = %self.id, note = id, "note body not found in rendered page");
        }
        Ok(())
    }

    fn parse_issue(&self, issue: &Value, subproject_field: &str) -> Snapshot {
        let fields = Fields { id: &self.id, issue };

        let relations = fields
            .section::<Vec<RelationRef>>("relations")
            .into_iter()
            .map(|r| {
                let near = r.issue_id.to_string();
                if near == self.id {
                    r.issue_to_id.to_string()
                } else {
                    near
                }
            })
            .collect();

        let notes = fields
            .section::<Vec<Journal>>("journals")
            .into_iter()
            .filter(|j| j.notes.as_deref().is_some_and(|n| !n.is_empty()))
            .filter_map(|j| match (j.user, j.created_on) {
                (Some(user), Some(created_on)) => Some(NoteRef {
                    id: j.id,
                    author: user.name,
                    created_on,
                }),
                _ => {
                    warn!(issue = %self.id, note = j.id, "note without author or date, skipped");
                    None
                }
            })
            .collect();

        Snapshot {
            id: self.id.clone(),
            tracker: fields.name("tracker"),
            status: fields.name("status"),
            priority: fields.name("priority"),
            assignee: fields.name("assigned_to"),
            target_version: fields.name("fixed_version"),
            sub_project: fields.custom_field(subproject_field),
            title: fields.text("subject"),
            created_by: fields.name("author"),
            created_on: fields.text("created_on"),
            closed_on: fields.text("closed_on"),
            parent: fields
                .section::<Option<IdRef>>("parent")
                .map(|p| p.id.to_string())
                .unwrap_or_default(),
            relations,
            children: fields
                .section::<Vec<IdRef>>("children")
                .into_iter()
                .map(|c| c.id.to_string())
                .collect(),
            attachments: fields
                .section::<Vec<AttachmentEntry>>("attachments")
                .into_iter()
                .map(|a| AttachmentRef {
                    id: a.id.to_string(),
                    filename: a.filename,
                    url: a.content_url,
                })
                .collect(),
            notes,
        }
    }

    /// Write the issue under `root/<id>/`. An existing directory means the
    /// issue was dumped before; nothing is fetched or written then.
    pub async fn dump(&mut self, api: &dyn SourceApi, root: &Path, subproject_field: &str) -> bool {
        let issue_dir = root.join(&self.id);
        if let Err(e) = create_layout(root, &issue_dir) {
            error!(issue = %self.id, error = %e, "failed to dump issue, cannot create output directories");
            return false;
        }

        if !self.fill(api, subproject_field).await {
            if let Err(e) = std::fs::remove_dir_all(&issue_dir) {
                warn!(issue = %self.id, error = %e, "cannot remove partial snapshot directory");
            }
            return false;
        }

        self.write(api, &issue_dir).await;
        info!(issue = %self.id, attachments = self.record.attachments.len(), notes = self.notes_content.len(), "dumped");
        true
    }

    async fn write(&self, api: &dyn SourceApi, issue_dir: &Path) {
        if let Err(e) = self.record.save(issue_dir) {
            error!(issue = %self.id, error = %e, "failed to dump json");
        }

        if let Err(e) = std::fs::write(issue_dir.join(DESCRIPTION_FILE), &self.description) {
            error!(issue = %self.id, error = %e, "failed to dump description");
        }

        let history_dir = issue_dir.join(HISTORY_DIR);
        for (note_id, body) in &self.notes_content {
            if let Err(e) = std::fs::write(history_dir.join(format!("{note_id}.htm")), body) {
                error!(issue = %self.id, note = note_id, error = %e, "failed to dump history entry");
            }
        }

        let attachments_dir = issue_dir.join(ATTACHMENTS_DIR);
        for (idx, attachment) in self.record.attachments.iter().enumerate() {
            let result: Result<()> = match contained_path(&attachments_dir, &attachment.filename) {
                Some(path) => match api.download(&attachment.url).await {
                    Ok(bytes) => std::fs::write(&path, bytes)
                        .with_context(|| format!("Failed to write {}", path.display())),
                    Err(e) => Err(e),
                },
                None => Err(MigrateError::UnsafeFileName(attachment.filename.clone()).into()),
            };
            if let Err(e) = result {
                error!(issue = %self.id, attachment = idx, filename = %attachment.filename, error = %e, "failed to dump attachment");
            }
        }
    }
}

fn create_layout(root: &Path, issue_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create {}", root.display()))?;
    match std::fs::create_dir(issue_dir) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(MigrateError::AlreadyDumped {
                path: issue_dir.to_path_buf(),
            }
            .into())
        }
        other => other.with_context(|| format!("Failed to create {}", issue_dir.display()))?,
    }
    std::fs::create_dir(issue_dir.join(ATTACHMENTS_DIR))?;
    std::fs::create_dir(issue_dir.join(HISTORY_DIR))?;
    Ok(())
}
