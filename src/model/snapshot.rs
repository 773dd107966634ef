use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DATA_FILE: &str = "data.json";
pub const DESCRIPTION_FILE: &str = "description.htm";
pub const ATTACHMENTS_DIR: &str = "attachments";
pub const HISTORY_DIR: &str = "history";

/// Normalized copy of one Redmine issue, stored as `data.json` in the issue's
/// snapshot directory. Once dumped it is the only source later phases read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub id: String,
    pub tracker: String,
    pub status: String,
    pub priority: String,
    pub assignee: String,
    pub target_version: String,
    pub sub_project: String,
    pub title: String,
    pub created_by: String,
    pub created_on: String,
    pub closed_on: String,
    /// Empty when the issue has no parent.
    pub parent: String,
    pub relations: Vec<String>,
    pub children: Vec<String>,
    pub attachments: Vec<AttachmentRef>,
    pub notes: Vec<NoteRef>,
}

/// `dir/filename`, or `None` when `filename` is not a bare file name and
/// could resolve outside `dir`.
pub fn contained_path(dir: &Path, filename: &str) -> Option<PathBuf> {
    let name = Path::new(filename);
    (name.file_name() == Some(name.as_os_str())).then(|| dir.join(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    /// Absolute download URL on the source server.
    pub url: String,
}

/// Journal entry metadata; the body lives in `history/<id>.htm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRef {
    pub id: u64,
    pub author: String,
    pub created_on: String,
}

impl Snapshot {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(DATA_FILE);
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(DATA_FILE), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_camel_case_keys_on_disk() {
        let snapshot = Snapshot {
            id: "42".into(),
            target_version: "1.0".into(),
            sub_project: "api".into(),
            notes: vec![NoteRef {
                id: 7,
                author: "Ann".into(),
                created_on: "2020-01-01T00:00:00Z".into(),
            }],
            ..Snapshot::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"targetVersion\":\"1.0\""));
        assert!(json.contains("\"subProject\":\"api\""));
        assert!(json.contains("\"created_on\""));
    }

    #[test]
    fn only_bare_file_names_stay_inside_dir() {
        let dir = Path::new("/dump/9/attachments");
        assert_eq!(
            contained_path(dir, "trace.log"),
            Some(PathBuf::from("/dump/9/attachments/trace.log"))
        );
        for name in ["../../escaped.txt", "/etc/passwd", "sub/file.txt", "..", ".", ""] {
            assert_eq!(contained_path(dir, name), None, "{name}");
        }
    }

    #[test]
    fn missing_keys_default_to_empty() {
        let snapshot: Snapshot = serde_json::from_str(r#"{"id":"5","tracker":"Bug"}"#).unwrap();
        assert_eq!(snapshot.id, "5");
        assert!(snapshot.parent.is_empty());
        assert!(snapshot.attachments.is_empty());
    }

    #[test]
    fn save_then_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot {
            id: "9".into(),
            relations: vec!["10".into()],
            attachments: vec![AttachmentRef {
                id: "3".into(),
                filename: "log.txt".into(),
                url: "https://rm/attachments/download/3/log.txt".into(),
            }],
            ..Snapshot::default()
        };
        snapshot.save(dir.path()).unwrap();
        assert_eq!(Snapshot::load(dir.path()).unwrap(), snapshot);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Snapshot::load(dir.path()).unwrap_err();
        assert!(err.to_string().contains("data.json"));
    }
}
