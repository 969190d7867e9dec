//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use spirits_core::SiteId;

const CONFIG_FILE_NAME: &str = "cli-config.json";
const DB_PATH_ENV: &str = "SPIRITS_DB_PATH";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    /// Database location used when neither `--db-path` nor `SPIRITS_DB_PATH` is set
    #[serde(default)]
    pub db_path: Option<String>,
    /// Site identity to pin the store to, e.g. when restoring a device
    #[serde(default)]
    pub site_id: Option<String>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spirits").join(CONFIG_FILE_NAME))
}

pub fn default_db_path() -> Result<PathBuf, String> {
    dirs::data_dir()
        .map(|dir| dir.join("spirits").join("spirits.db"))
        .ok_or_else(|| "Failed to resolve CLI data directory".to_string())
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        default_config_path().map_or_else(|| Ok(Self::default()), |path| Self::load_from_path(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    /// Flag, then `SPIRITS_DB_PATH`, then config, then the platform data directory
    pub fn resolve_db_path(&self, cli_db_path: Option<PathBuf>) -> Result<PathBuf, String> {
        if let Some(path) = cli_db_path {
            return Ok(path);
        }
        if let Some(path) = normalize_text_option(std::env::var(DB_PATH_ENV).ok()) {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = self.db_path.as_deref() {
            return Ok(PathBuf::from(path));
        }
        default_db_path()
    }

    /// The pinned site, if the config names a valid one
    pub fn site_override(&self) -> Result<Option<SiteId>, String> {
        self.site_id
            .as_deref()
            .map(|value| {
                value
                    .parse::<SiteId>()
                    .map_err(|error| format!("Invalid site_id {value:?} in config: {error}"))
            })
            .transpose()
    }

    fn normalize(&mut self) {
        self.db_path = normalize_text_option(self.db_path.take());
        self.site_id = normalize_text_option(self.site_id.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
        assert_eq!(
            normalize_text_option(Some(" beer.db ".to_string())),
            Some("beer.db".to_string())
        );
    }

    #[test]
    fn load_normalizes_fields() {
        let path = std::env::temp_dir().join(format!(
            "spirits-cli-config-test-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ));
        std::fs::write(
            &path,
            r#"{ "db_path": " /tmp/spirits/test.db ", "site_id": "  " }"#,
        )
        .unwrap();

        let loaded = CliConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.db_path.as_deref(), Some("/tmp/spirits/test.db"));
        assert_eq!(loaded.site_id, None);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_config_loads_defaults() {
        let path = std::env::temp_dir().join("spirits-cli-config-does-not-exist.json");
        assert_eq!(CliConfig::load_from_path(&path).unwrap(), CliConfig::default());
    }

    #[test]
    fn explicit_db_path_wins() {
        let config = CliConfig {
            db_path: Some("/from/config.db".to_string()),
            ..CliConfig::default()
        };
        assert_eq!(
            config
                .resolve_db_path(Some(PathBuf::from("/from/flag.db")))
                .unwrap(),
            PathBuf::from("/from/flag.db")
        );
    }

    #[test]
    fn site_override_parses_or_reports() {
        let site = SiteId::new();
        let config = CliConfig {
            site_id: Some(site.to_string()),
            ..CliConfig::default()
        };
        assert_eq!(config.site_override().unwrap(), Some(site));

        let broken = CliConfig {
            site_id: Some("not-a-site".to_string()),
            ..CliConfig::default()
        };
        assert!(broken.site_override().is_err());
        assert_eq!(CliConfig::default().site_override().unwrap(), None);
    }
}
