use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VypiskaError};

pub const DB_FILE_NAME: &str = "vypiska.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    /// Name fragment identifying our own organization in the directory.
    #[serde(default)]
    pub own_organization: String,
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir_string(),
            own_organization: String::new(),
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(DB_FILE_NAME)
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn config_dir() -> PathBuf {
    home().join(".config").join("vypiska")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    home().join("Documents").join("vypiska")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(config_dir())?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| VypiskaError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        return format!("{}{rest}", home().to_string_lossy());
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            own_organization: "ИП Селецкий".to_string(),
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.data_dir, "/tmp/test");
        assert_eq!(loaded.own_organization, "ИП Селецкий");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let s: Settings = serde_json::from_str(r#"{"data_dir": "/tmp/test"}"#).unwrap();
        assert!(s.own_organization.is_empty());
        let s: Settings = serde_json::from_str("{}").unwrap();
        assert!(s.data_dir.ends_with("vypiska"));
    }

    #[test]
    fn test_db_path() {
        let s = Settings {
            data_dir: "/data".to_string(),
            own_organization: String::new(),
        };
        assert_eq!(s.db_path(), PathBuf::from("/data/vypiska.db"));
    }

    #[test]
    fn test_shellexpand_tilde() {
        let expanded = shellexpand_path("~/books");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/books"));
    }
}
