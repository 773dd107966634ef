use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::providers::UploadedAttachment;

pub const ID_MAP_FILE: &str = "redmine2azure.json";
pub const ATTACHMENT_MAP_FILE: &str = "attachments.json";

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Source id to destination id correspondence, persisted in the working
/// directory between runs. Existing entries are never overwritten.
#[derive(Debug)]
pub struct IdMap {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl IdMap {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            path: working_dir.join(ID_MAP_FILE),
            entries: BTreeMap::new(),
        }
    }

    /// Read the map from disk. Returns `Ok(false)` when no map was stored yet.
    /// A map that exists but cannot be parsed is an error, never an empty map.
    pub fn load(&mut self) -> Result<bool> {
        match read_json(&self.path)? {
            Some(entries) => {
                self.entries = entries;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn save(&self) -> Result<()> {
        write_json(&self.path, &self.entries)
    }

    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.entries
            .get(source_id)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Record a new mapping. Returns false, leaving the map unchanged, when
    /// `source_id` is already mapped. An empty stored id counts as unmapped.
    pub fn insert(&mut self, source_id: &str, destination_id: &str) -> bool {
        if self.get(source_id).is_some() {
            return false;
        }
        self.entries
            .insert(source_id.to_string(), destination_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Attachments already uploaded for one work item, keyed by source filename.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AttachmentMap {
    entries: BTreeMap<String, UploadedAttachment>,
}

impl AttachmentMap {
    /// Load `attachments.json` from an item's working directory, or `None`
    /// when nothing was uploaded yet.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        Ok(read_json(&dir.join(ATTACHMENT_MAP_FILE))?.map(|entries| Self { entries }))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json(&dir.join(ATTACHMENT_MAP_FILE), &self.entries)
    }

    pub fn get(&self, filename: &str) -> Option<&UploadedAttachment> {
        self.entries.get(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn insert(&mut self, filename: &str, attachment: UploadedAttachment) {
        self.entries.insert(filename.to_string(), attachment);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UploadedAttachment)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_id_map_loads_as_clean_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = IdMap::new(dir.path());
        assert!(!map.load().unwrap());
        assert!(map.is_empty());
    }

    #[test]
    fn id_map_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = IdMap::new(dir.path());
        assert!(map.insert("100", "5001"));
        assert!(!map.insert("100", "9999"));
        assert_eq!(map.get("100"), Some("5001"));
    }

    #[test]
    fn id_map_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = IdMap::new(dir.path());
        map.insert("100", "5001");
        map.insert("101", "5002");
        map.save().unwrap();

        let mut reloaded = IdMap::new(dir.path());
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("101"), Some("5002"));
    }

    #[test]
    fn corrupt_id_map_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ID_MAP_FILE), "{not json").unwrap();
        assert!(IdMap::new(dir.path()).load().is_err());
    }

    #[test]
    fn empty_destination_id_reads_as_unmapped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ID_MAP_FILE), r#"{"7": ""}"#).unwrap();
        let mut map = IdMap::new(dir.path());
        map.load().unwrap();
        assert_eq!(map.get("7"), None);
    }

    #[test]
    fn empty_destination_id_is_replaced_on_insert() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ID_MAP_FILE), r#"{"7": ""}"#).unwrap();
        let mut map = IdMap::new(dir.path());
        map.load().unwrap();
        assert!(map.insert("7", "5001"));
        map.save().unwrap();

        let mut reloaded = IdMap::new(dir.path());
        reloaded.load().unwrap();
        assert_eq!(reloaded.get("7"), Some("5001"));
    }

    #[test]
    fn attachment_map_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AttachmentMap::load(dir.path()).unwrap(), None);

        let mut map = AttachmentMap::default();
        map.insert(
            "shot.png",
            UploadedAttachment {
                id: "a1".into(),
                url: "https://az/att/a1".into(),
            },
        );
        map.save(dir.path()).unwrap();

        let reloaded = AttachmentMap::load(dir.path()).unwrap().unwrap();
        assert_eq!(reloaded, map);
        assert_eq!(reloaded.get("shot.png").unwrap().url, "https://az/att/a1");
    }
}
