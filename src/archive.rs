//! Deterministic archival of processed files into a dated subtree.
//!
//! A processed file moves to `<archive_root>/<YYYY-MM>/<basename>`. A
//! collision at the destination refuses the move and leaves the source in
//! place, so a re-run can retry without data loss.

use std::{fs, path::{Path, PathBuf}};

use chrono::NaiveDate;
use log::info;

use crate::error::FileError;

pub fn archive(path: &Path, archive_root: &Path, date: NaiveDate) -> Result<PathBuf, FileError> {
    let subdir = archive_root.join(date.format("%Y-%m").to_string());
    let file_name = path.file_name().ok_or_else(|| FileError::Archive {
        from: path.to_path_buf(),
        to: subdir.clone(),
        reason: "source path has no file name".to_string(),
    })?;
    let destination = subdir.join(file_name);

    let archive_error = |reason: String| FileError::Archive {
        from: path.to_path_buf(),
        to: destination.clone(),
        reason,
    };

    fs::create_dir_all(&subdir).map_err(|e| archive_error(e.to_string()))?;
    if destination.exists() {
        return Err(archive_error("destination already exists".to_string()));
    }
    fs::rename(path, &destination).map_err(|e| archive_error(e.to_string()))?;
    info!("Archived {} to {}", path.display(), destination.display());
    Ok(destination)
}
