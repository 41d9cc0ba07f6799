//! Removal of chapter directories that are empty or already archived.

use std::fs;
use std::io;

use crate::error::{Error, Result};
use crate::models::{Chapter, Series};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Missing,
    RemovedEmpty,
    RemovedArchived,
    Kept,
}

pub fn is_empty_dir(path: &std::path::Path) -> io::Result<bool> {
    let mut entries = fs::read_dir(path)?;
    Ok(entries.next().is_none())
}

pub fn cleanup_chapter(chapter: &Chapter) -> io::Result<CleanupAction> {
    let empty = match is_empty_dir(&chapter.directory) {
        Ok(empty) => empty,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CleanupAction::Missing),
        Err(e) => return Err(e),
    };

    let action = if empty {
        fs::remove_dir(&chapter.directory).map(|_| CleanupAction::RemovedEmpty)
    } else if chapter.archive_path().is_file() {
        fs::remove_dir_all(&chapter.directory).map(|_| CleanupAction::RemovedArchived)
    } else {
        Ok(CleanupAction::Kept)
    };

    match action {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(CleanupAction::Missing),
        other => other,
    }
}

/// Clean every chapter of the series; returns how many directories went away
pub fn cleanup_series(series: &Series) -> Result<usize> {
    let mut removed = 0;
    for chapter in &series.chapters {
        let action = cleanup_chapter(chapter).map_err(|source| Error::Cleanup {
            path: chapter.directory.clone(),
            source,
        })?;
        if matches!(action, CleanupAction::RemovedEmpty | CleanupAction::RemovedArchived) {
            tracing::debug!(chapter = %chapter.name, ?action, "chapter directory removed");
            removed += 1;
        }
    }
    Ok(removed)
}
