//! On-disk storage for client documents

use crate::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Reads and atomically replaces documents
pub trait FileStore {
    fn read(&self, path: &Path) -> Result<String>;

    /// Replace `path` with `contents` so that readers see either the old or
    /// the new document, never a truncated one
    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()>;
}

/// [`FileStore`] backed by the local filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore {
    /// Keep a timestamped copy of the previous document before replacing it
    pub backup: bool,
}

impl LocalFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    /// Sibling temp file, so the final rename stays on one filesystem
    fn temp_path(path: &Path) -> Result<PathBuf> {
        let file_name = file_name(path)?;
        let id = uuid::Uuid::new_v4().simple();
        Ok(path.with_file_name(format!(".{}.{}.tmp", file_name, id)))
    }

    /// Path of the backup taken at `now`, e.g. `frpc_home.toml.bak-20240101-120000`
    pub fn backup_path(path: &Path, now: chrono::DateTime<chrono::Local>) -> Result<PathBuf> {
        let file_name = file_name(path)?;
        Ok(path.with_file_name(format!(
            "{}.bak-{}",
            file_name,
            now.format("%Y%m%d-%H%M%S")
        )))
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|f| f.to_string_lossy().to_string())
        .ok_or_else(|| Error::validation(format!("Invalid document path: {}", path.display())))
}

/// Create the temp file with the original's mode already applied, before any
/// contents reach it
fn create_temp(tmp: &Path, original: &Path) -> std::io::Result<File> {
    let file = File::create(tmp)?;
    // Documents carry tokens, keep whatever mode the operator gave the original
    if let Ok(meta) = fs::metadata(original) {
        file.set_permissions(meta.permissions())?;
    }
    Ok(file)
}

fn write_synced(tmp: &Path, original: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = create_temp(tmp, original)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

impl FileStore for LocalFileStore {
    fn read(&self, path: &Path) -> Result<String> {
        Ok(fs::read_to_string(path)?)
    }

    fn write_atomic(&self, path: &Path, contents: &str) -> Result<()> {
        let tmp = Self::temp_path(path)?;

        if let Err(e) = write_synced(&tmp, path, contents) {
            fs::remove_file(&tmp).ok();
            return Err(e.into());
        }

        if self.backup && path.exists() {
            let backup = Self::backup_path(path, chrono::Local::now())?;
            if let Err(e) = fs::copy(path, &backup) {
                fs::remove_file(&tmp).ok();
                return Err(e.into());
            }
            log::info!("Backed up {} to {}", path.display(), backup.display());
        }

        if let Err(e) = fs::rename(&tmp, path) {
            fs::remove_file(&tmp).ok();
            return Err(e.into());
        }
        Ok(())
    }
}
