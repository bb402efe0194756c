//! Loading configuration set documents
//!
//! A set is read from JSON or TOML, picked by file extension. Both formats
//! share the serde shape of [`ConfigurationSet`].

use anyhow::{Context, Result, bail};
use configset::ConfigurationSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => bail!(
                "Unsupported document format: {} (expected .json or .toml)",
                path.display()
            ),
        }
    }
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Parse a set document
pub fn parse_set(content: &str, format: DocumentFormat) -> Result<ConfigurationSet> {
    let set = match format {
        DocumentFormat::Json => serde_json::from_str(content)?,
        DocumentFormat::Toml => toml::from_str(content)?,
    };
    Ok(set)
}

/// Read and parse the set at `path`
///
/// A set without a name is named after its file.
pub fn load_set(path: &str) -> Result<ConfigurationSet> {
    let path = expand_path(path);
    let format = DocumentFormat::from_path(&path)?;

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let mut set = parse_set(&content, format)
        .with_context(|| format!("Invalid configuration set: {}", path.display()))?;

    if set.path.is_empty() {
        set.path = path.display().to_string();
    }
    if set.name.is_empty()
        && let Some(stem) = path.file_stem()
    {
        set.name = stem.to_string_lossy().into_owned();
    }

    log::debug!("Loaded '{}' with {} units", set.name, set.unit_count());
    Ok(set)
}
