//! File formats for plan and experiment documents

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Chosen from the file extension: `.yaml`/`.yml` are YAML, anything else JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                FileFormat::Yaml
            }
            _ => FileFormat::Json,
        }
    }

    pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        match Self::from_path(path) {
            FileFormat::Json => Ok(serde_json::from_str(&content)?),
            FileFormat::Yaml => Ok(serde_yaml::from_str(&content)?),
        }
    }

    pub fn write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let content = match Self::from_path(path) {
            FileFormat::Json => serde_json::to_string_pretty(value)?,
            FileFormat::Yaml => serde_yaml::to_string(value)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}
