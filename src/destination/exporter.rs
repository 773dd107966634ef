use std::path::PathBuf;
use tracing::{error, info, warn};

use super::item::DestinationItem;
use super::store::IdMap;
use crate::config::DestinationConfig;
use crate::providers::DestinationApi;

/// Drives the create, attachment and patch passes over every snapshot.
pub struct Exporter {
    api: Box<dyn DestinationApi>,
    snapshot_dir: PathBuf,
    working_dir: PathBuf,
    closed_date_fallback: String,
    pub items: Vec<DestinationItem>,
    pub id_map: IdMap,
}

impl Exporter {
    pub fn new(api: Box<dyn DestinationApi>, snapshot_dir: PathBuf, config: &DestinationConfig) -> Self {
        Self {
            api,
            id_map: IdMap::new(&config.working_dir),
            snapshot_dir,
            working_dir: config.working_dir.clone(),
            closed_date_fallback: config.closed_date_fallback.clone(),
            items: Vec::new(),
        }
    }

    /// Load every snapshot directory, or only those named in `only`.
    /// Snapshots that cannot be read or mapped are logged and left out.
    pub fn load(&mut self, only: Option<&[String]>) -> anyhow::Result<usize> {
        info!(dir = %self.snapshot_dir.display(), "loading snapshots");
        std::fs::create_dir_all(&self.working_dir)?;

        let mut names: Vec<String> = std::fs::read_dir(&self.snapshot_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(String::from))
            .filter(|name| only.map_or(true, |ids| ids.contains(name)))
            .collect();
        // Issue ids sort numerically.
        names.sort_by(|a, b| (a.len(), a.as_str()).cmp(&(b.len(), b.as_str())));

        for name in names {
            let snapshot_dir = self.snapshot_dir.join(&name);
            let working_dir = self.working_dir.join(&name);
            match DestinationItem::load(&snapshot_dir, &working_dir, &self.closed_date_fallback) {
                Ok(item) => self.items.push(item),
                Err(e) => error!(issue = %name, error = %e, "cannot load snapshot, skipped"),
            }
        }

        info!(count = self.items.len(), "loaded items");
        Ok(self.items.len())
    }

    /// Create a work item for every loaded snapshot that the identifier map
    /// does not know yet. Refuses to run once this exporter holds mappings,
    /// since creating is not repeatable on the live system.
    ///
    /// The map is saved once, after the whole pass.
    pub async fn create(&mut self) -> bool {
        if !self.id_map.is_empty() {
            error!("cannot run create a second time");
            return false;
        }

        info!("creating work items");
        match self.id_map.load() {
            Ok(true) => info!(mapped = self.id_map.len(), "resuming from stored identifier map"),
            Ok(false) => info!(path = %self.id_map.path().display(), "no identifier map, clean run"),
            Err(e) => {
                error!(error = %e, "cannot read identifier map");
                return false;
            }
        }

        let total = self.items.len();
        for (idx, item) in self.items.iter_mut().enumerate() {
            if let Some(existing) = self.id_map.get(&item.source_id) {
                warn!(issue = %item.source_id, work_item = %existing, "already created, skipped");
                item.id = Some(existing.to_string());
            } else if item.create_workitem(self.api.as_ref()).await {
                if let Some(id) = &item.id {
                    self.id_map.insert(&item.source_id, id);
                }
            }
            info!("finished #{} of {}", idx + 1, total);
        }

        match self.id_map.save() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "cannot save identifier map");
                false
            }
        }
    }

    /// Attach ids from the stored identifier map without creating anything,
    /// so later passes can run in a fresh process.
    pub fn resume(&mut self) -> bool {
        match self.id_map.load() {
            Ok(true) => {}
            Ok(false) => {
                error!(path = %self.id_map.path().display(), "no identifier map to resume from");
                return false;
            }
            Err(e) => {
                error!(error = %e, "cannot read identifier map");
                return false;
            }
        }
        for item in &mut self.items {
            match self.id_map.get(&item.source_id) {
                Some(id) => item.id = Some(id.to_string()),
                None => warn!(issue = %item.source_id, "not created yet"),
            }
        }
        info!(mapped = self.id_map.len(), "resumed from identifier map");
        true
    }

    pub async fn attachments(&mut self) -> bool {
        info!("uploading attachments");
        let total = self.items.len();
        for (idx, item) in self.items.iter_mut().enumerate() {
            item.create_attachments(self.api.as_ref()).await;
            info!("finished attachments for #{} of {}", idx + 1, total);
        }
        true
    }

    pub async fn patch(&self) -> bool {
        info!("patching work items");
        let total = self.items.len();
        for (idx, item) in self.items.iter().enumerate() {
            if item.id.is_some() {
                item.patch(self.api.as_ref(), &self.id_map).await;
            }
            info!("finished patching #{} of {}", idx + 1, total);
        }
        true
    }
}
