//! # Persistence
//!
//! The final document replaces the engine's config file wholesale. Before
//! the replacement, any existing config is copied into the backup
//! directory under a timestamped name so a bad run can be rolled back by
//! hand. A backup failure is surfaced in the run report but never blocks
//! the write; the new document is the thing the operator asked for.
//!
//! The write itself goes through a temporary file in the target
//! directory followed by a rename, so a crash mid-write can never leave
//! a truncated config behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use serde_yaml::Value;

use crate::document;
use crate::error::{Error, Result};

/// Copy the current config (if any) into the backup directory.
///
/// Returns the backup path when a backup was made, `None` when there was
/// nothing to back up.
pub fn backup_existing(config_file: &Path, backup_dir: &Path) -> Result<Option<PathBuf>> {
    if !config_file.exists() {
        return Ok(None);
    }

    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = backup_dir.join(format!("config_{}.yaml", stamp));
    std::fs::create_dir_all(backup_dir).map_err(|err| Error::Persist {
        path: backup_dir.display().to_string(),
        message: format!("failed to create backup directory: {}", err),
    })?;
    std::fs::copy(config_file, &backup_path).map_err(|err| Error::Persist {
        path: backup_path.display().to_string(),
        message: format!("failed to back up existing config: {}", err),
    })?;
    info!("backed up existing config to {}", backup_path.display());
    Ok(Some(backup_path))
}

/// Serialize the document and atomically replace the config file.
pub fn write_config(config: &Value, config_file: &Path) -> Result<()> {
    let text = document::to_yaml_string(config)?;
    let dir = config_file.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    // Same filesystem as the target, so the rename is atomic.
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(text.as_bytes())?;
    temp.flush()?;
    temp.persist(config_file).map_err(|err| Error::Persist {
        path: config_file.display().to_string(),
        message: format!("failed to replace config: {}", err),
    })?;

    info!("wrote merged config to {}", config_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_backup_skipped_when_no_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result =
            backup_existing(&tmp.path().join("config.yaml"), &tmp.path().join("backups")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_backup_copies_existing_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_file = tmp.path().join("config.yaml");
        std::fs::write(&config_file, "mode: rule\n").unwrap();

        let backup_dir = tmp.path().join("backups");
        let backup = backup_existing(&config_file, &backup_dir).unwrap().unwrap();
        assert!(backup.starts_with(&backup_dir));
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("config_"));
        assert!(name.ends_with(".yaml"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "mode: rule\n");
        // Original stays in place until the new document replaces it.
        assert!(config_file.exists());
    }

    #[test]
    fn test_write_config_creates_and_replaces() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_file = tmp.path().join("nested").join("config.yaml");

        write_config(&doc("mode: rule"), &config_file).unwrap();
        assert!(std::fs::read_to_string(&config_file)
            .unwrap()
            .contains("mode: rule"));

        write_config(&doc("mode: global"), &config_file).unwrap();
        let text = std::fs::read_to_string(&config_file).unwrap();
        assert!(text.contains("mode: global"));
        assert!(!text.contains("mode: rule"));
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config_file = tmp.path().join("config.yaml");
        write_config(&doc("a: 1"), &config_file).unwrap();
        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
