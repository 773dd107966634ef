use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
}

/// Redmine connection and the directory snapshots are dumped into.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub project: String,
    pub api_key: String,
    pub dump_dir: PathBuf,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Name of the custom field carrying the sub-project.
    #[serde(default = "default_subproject_field")]
    pub subproject_field: String,
}

/// Azure DevOps connection and the working directory for upload/patch state.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    #[serde(default = "default_azure_base_url")]
    pub base_url: String,
    pub organization: String,
    pub project: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub token: String,
    pub working_dir: PathBuf,
    /// Close date used when the source close timestamp is missing or implausible.
    #[serde(default = "default_closed_date_fallback")]
    pub closed_date_fallback: String,
}

fn default_page_size() -> usize {
    100
}

fn default_subproject_field() -> String {
    "Sub project".into()
}

fn default_azure_base_url() -> String {
    "https://dev.azure.com".into()
}

fn default_api_version() -> String {
    "7.1-preview.3".into()
}

fn default_closed_date_fallback() -> String {
    "2024-03-30T00:00:00Z".into()
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tracker-migrate")
        .join("config.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.map_or_else(default_config_path, Path::to_path_buf);
    if !path.exists() {
        bail!(
            "No configuration at {}. Create it with [source] and [destination] tables",
            path.display()
        );
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents)?;
    if config.source.page_size == 0 {
        bail!("source.page_size must be at least 1");
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [source]
        base_url = "https://redmine.example.com"
        project = "core"
        api_key = "rm-key"
        dump_dir = "/tmp/redmine"

        [destination]
        organization = "acme"
        project = "Core"
        token = "pat"
        working_dir = "/tmp/azure"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.source.page_size, 100);
        assert_eq!(config.source.subproject_field, "Sub project");
        assert_eq!(config.destination.base_url, "https://dev.azure.com");
        assert_eq!(config.destination.api_version, "7.1-preview.3");
        assert_eq!(config.destination.closed_date_fallback, "2024-03-30T00:00:00Z");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let toml = MINIMAL.replace(
            "dump_dir = \"/tmp/redmine\"",
            "dump_dir = \"/tmp/redmine\"\npage_size = 25\nsubproject_field = \"Component\"",
        );
        let config = parse_config(&toml).unwrap();
        assert_eq!(config.source.page_size, 25);
        assert_eq!(config.source.subproject_field, "Component");
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let toml = MINIMAL.replace(
            "dump_dir = \"/tmp/redmine\"",
            "dump_dir = \"/tmp/redmine\"\npage_size = 0",
        );
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn missing_credentials_fail() {
        let toml = MINIMAL.replace("token = \"pat\"", "");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
