use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::store::{AttachmentMap, IdMap};
use super::text::{note_header, rewrite_attachment_urls};
use crate::error::MigrateError;
use crate::model::mapping::{Priority, WorkItemState, WorkItemType};
use crate::model::patch::{fields, PatchDocument, Relation};
use crate::model::snapshot::{
    contained_path, Snapshot, ATTACHMENTS_DIR, DESCRIPTION_FILE, HISTORY_DIR,
};
use crate::providers::DestinationApi;

/// One snapshot on its way into Azure DevOps.
///
/// Exists only once the snapshot is loaded and mapped; `id` is set after the
/// work item is created (or recovered from the identifier map) and is never
/// cleared afterwards. Every patch step needs it.
pub struct DestinationItem {
    snapshot_dir: PathBuf,
    working_dir: PathBuf,
    snapshot: Snapshot,
    pub source_id: String,
    pub id: Option<String>,
    kind: WorkItemType,
    state: WorkItemState,
    priority: Priority,
    title: String,
    tags: String,
    closed_date_fallback: String,
    attachments: AttachmentMap,
}

impl DestinationItem {
    /// Read `data.json` from `snapshot_dir` and map it onto destination
    /// fields. Any previously stored attachment map in `working_dir` is
    /// picked up so patch steps can run without a fresh upload pass.
    pub fn load(snapshot_dir: &Path, working_dir: &Path, closed_date_fallback: &str) -> Result<Self> {
        let snapshot = Snapshot::load(snapshot_dir)?;
        if snapshot.id.is_empty() {
            return Err(MigrateError::MissingField("id").into());
        }
        let kind = WorkItemType::from_tracker(&snapshot.tracker)?;
        let state = WorkItemState::from_status(&snapshot.status, kind)?;
        let priority = Priority::from_redmine(&snapshot.priority)?;
        let attachments = AttachmentMap::load(working_dir)
            .unwrap_or_else(|e| {
                warn!(issue = %snapshot.id, error = %e, "cannot read attachment map");
                None
            })
            .unwrap_or_default();

        Ok(Self {
            snapshot_dir: snapshot_dir.to_path_buf(),
            working_dir: working_dir.to_path_buf(),
            source_id: snapshot.id.clone(),
            id: None,
            kind,
            state,
            priority,
            title: format!("[REDMINE{}] {}", snapshot.id, snapshot.title),
            tags: format!("{};{}", snapshot.target_version, snapshot.sub_project),
            closed_date_fallback: closed_date_fallback.to_string(),
            attachments,
            snapshot,
        })
    }

    fn outcome(&self, action: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(
                    issue = %self.source_id,
                    work_item = self.id.as_deref().unwrap_or(""),
                    error = %e,
                    "cannot {}", action
                );
                false
            }
        }
    }

    fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .context("work item has not been created yet")
    }

    pub fn creation_patch(&self) -> PatchDocument {
        let s = &self.snapshot;
        PatchDocument::new()
            .add_field(fields::CREATED_DATE, s.created_on.as_str())
            .add_field(fields::TITLE, self.title.as_str())
            .add_field(fields::CREATED_BY, s.created_by.as_str())
            .add_field(fields::TAGS, self.tags.as_str())
            .add_field(fields::PRIORITY, self.priority.value())
            .add_field(fields::ASSIGNED_TO, s.assignee.as_str())
            .add_field(fields::STATE, self.state.as_str())
    }

    pub async fn create_workitem(&mut self, api: &dyn DestinationApi) -> bool {
        match api.create_work_item(self.kind, &self.creation_patch()).await {
            Ok(id) => {
                info!(issue = %self.source_id, work_item = %id, kind = %self.kind, "created work item");
                self.id = Some(id);
                true
            }
            Err(e) => self.outcome("create work item", Err(e)),
        }
    }

    /// Upload every snapshot attachment not uploaded before. The attachment
    /// map is written back even when some uploads fail.
    pub async fn create_attachments(&mut self, api: &dyn DestinationApi) -> bool {
        if let Err(e) = std::fs::create_dir_all(&self.working_dir) {
            return self.outcome("create working directory", Err(e.into()));
        }
        match AttachmentMap::load(&self.working_dir) {
            Ok(Some(stored)) => self.attachments = stored,
            Ok(None) => info!(issue = %self.source_id, "no attachment has been uploaded yet"),
            Err(e) => warn!(issue = %self.source_id, error = %e, "cannot read attachment map"),
        }

        let mut all_uploaded = true;
        for attachment in &self.snapshot.attachments {
            let name = &attachment.filename;
            if self.attachments.contains(name) {
                info!(issue = %self.source_id, filename = %name, "attachment already uploaded");
                continue;
            }
            let result = match contained_path(&self.snapshot_dir.join(ATTACHMENTS_DIR), name) {
                Some(path) => match std::fs::read(&path) {
                    Ok(bytes) => api.upload_attachment(&name.replace('#', "n"), bytes).await,
                    Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display()))),
                },
                None => Err(MigrateError::UnsafeFileName(name.clone()).into()),
            };
            match result {
                Ok(uploaded) => self.attachments.insert(name, uploaded),
                Err(e) => {
                    all_uploaded = self.outcome("upload attachment", Err(e)) && all_uploaded;
                }
            }
        }

        let saved = self.attachments.save(&self.working_dir);
        self.outcome("save attachment map", saved) && all_uploaded
    }

    fn rewrite(&self, html: &str) -> String {
        let (text, missing) = rewrite_attachment_urls(html, &self.snapshot.attachments, &self.attachments);
        for filename in missing {
            warn!(issue = %self.source_id, filename = %filename, "no uploaded attachment to link, reference left as is");
        }
        text
    }

    /// Bugs keep their description in the repro steps field; every other
    /// type uses the plain description field.
    fn description_field(&self) -> &'static str {
        if self.kind == WorkItemType::Bug {
            fields::REPRO_STEPS
        } else {
            fields::DESCRIPTION
        }
    }

    pub async fn patch_description(&self, api: &dyn DestinationApi) -> bool {
        let result = self.try_patch_description(api).await;
        self.outcome("patch description", result)
    }

    async fn try_patch_description(&self, api: &dyn DestinationApi) -> Result<()> {
        let id = self.require_id()?;
        let path = self.snapshot_dir.join(DESCRIPTION_FILE);
        let html = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let description = self.rewrite(&html);

        let patch = PatchDocument::new().replace_field(self.description_field(), description.as_str());
        api.update_work_item(id, &patch, false).await?;

        std::fs::create_dir_all(&self.working_dir)?;
        std::fs::write(self.working_dir.join(DESCRIPTION_FILE), description)?;
        Ok(())
    }

    /// Link every uploaded attachment to the work item. Running this twice
    /// adds the links twice.
    pub async fn patch_attachments(&self, api: &dyn DestinationApi) -> bool {
        let id = match self.require_id() {
            Ok(id) => id,
            Err(e) => return self.outcome("link attachments", Err(e)),
        };
        let mut all_linked = true;
        for (name, uploaded) in self.attachments.iter() {
            let patch = PatchDocument::new().add_relation(Relation::attached_file(&uploaded.url));
            let result = api
                .update_work_item(id, &patch, false)
                .await
                .with_context(|| format!("attachment {name}"));
            all_linked = self.outcome("link attachment", result) && all_linked;
        }
        all_linked
    }

    /// Close date the work item gets when it is closed: the source timestamp
    /// if it looks like one, the configured fallback otherwise.
    pub fn closed_date(&self) -> &str {
        if self.snapshot.closed_on.len() > 5 {
            &self.snapshot.closed_on
        } else {
            &self.closed_date_fallback
        }
    }

    pub async fn patch_closedate(&self, api: &dyn DestinationApi) -> bool {
        if self.state != WorkItemState::Closed {
            return true;
        }
        let result = async {
            let id = self.require_id()?;
            let patch = PatchDocument::new().replace_field(fields::CLOSED_DATE, self.closed_date());
            api.update_work_item(id, &patch, true).await
        }
        .await;
        self.outcome("set close date", result)
    }

    /// Replay notes as comments, oldest first. Running this twice posts
    /// every comment twice.
    pub async fn patch_notes(&self, api: &dyn DestinationApi) -> bool {
        let id = match self.require_id() {
            Ok(id) => id,
            Err(e) => return self.outcome("add comments", Err(e)),
        };
        let history_dir = self.working_dir.join(HISTORY_DIR);
        if let Err(e) = std::fs::create_dir_all(&history_dir) {
            return self.outcome("create history directory", Err(e.into()));
        }

        let mut notes = self.snapshot.notes.clone();
        notes.sort_by_key(|n| n.id);

        let mut all_added = true;
        for note in &notes {
            let result = async {
                let path = self
                    .snapshot_dir
                    .join(HISTORY_DIR)
                    .join(format!("{}.htm", note.id));
                let html = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let content = note_header(&note.author, &note.created_on) + &self.rewrite(&html);

                let patch = PatchDocument::new()
                    .add_field(fields::HISTORY, content.as_str())
                    .add_field(fields::CHANGED_BY, note.author.as_str())
                    .add_field(fields::CREATED_DATE, note.created_on.as_str());
                api.update_work_item(id, &patch, true).await?;

                std::fs::write(history_dir.join(format!("{}.htm", note.id)), content)?;
                Ok::<(), anyhow::Error>(())
            }
            .await;
            all_added = self.outcome("add comment", result) && all_added;
        }
        all_added
    }

    /// Link the parent and related items that already have destination ids.
    /// Items not in the map yet are skipped, not retried.
    pub async fn patch_relations(&self, api: &dyn DestinationApi, id_map: &IdMap) -> bool {
        let id = match self.require_id() {
            Ok(id) => id,
            Err(e) => return self.outcome("patch relations", Err(e)),
        };

        let mut links = Vec::new();
        if !self.snapshot.parent.is_empty() {
            match id_map.get(&self.snapshot.parent) {
                Some(parent) => links.push(("set parent", Relation::parent(&api.work_item_url(parent)))),
                None => info!(issue = %self.source_id, parent = %self.snapshot.parent, "parent not migrated, skipped"),
            }
        }
        for related in &self.snapshot.relations {
            match id_map.get(related) {
                Some(target) => links.push(("add related item", Relation::related(&api.work_item_url(target)))),
                None => info!(issue = %self.source_id, related = %related, "related item not migrated, skipped"),
            }
        }

        let mut all_linked = true;
        for (action, relation) in links {
            let patch = PatchDocument::new().add_relation(relation);
            let result = api.update_work_item(id, &patch, false).await;
            all_linked = self.outcome(action, result) && all_linked;
        }
        all_linked
    }

    /// Run every patch step in order. Fails without touching the API when
    /// the work item does not exist yet.
    pub async fn patch(&self, api: &dyn DestinationApi, id_map: &IdMap) -> bool {
        if self.id.is_none() {
            warn!(issue = %self.source_id, "no work item to patch");
            return false;
        }
        self.patch_closedate(api).await;
        self.patch_attachments(api).await;
        self.patch_description(api).await;
        self.patch_notes(api).await;
        self.patch_relations(api, id_map).await;
        true
    }
}
