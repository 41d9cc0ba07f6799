//! Chapter archives.
//!
//! What goes into an archive is decided by listing the chapter directory at
//! archive time, so files left by an earlier run are packed together with the
//! ones downloaded now.

pub mod cleanup;

pub use cleanup::{CleanupAction, cleanup_chapter, cleanup_series};

use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::FetchConfig;
use crate::error::{ArchiveError, Error, Result};
use crate::models::{Chapter, Series};
use crate::progress::ProgressTracker;

/// Target archive plus the files that go into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveDescriptor {
    pub path: PathBuf,
    pub files: Vec<PathBuf>,
}

impl ArchiveDescriptor {
    /// `None` when the chapter directory is missing or holds no files
    pub fn for_chapter(chapter: &Chapter) -> io::Result<Option<Self>> {
        let files = match list_files(&chapter.directory) {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if files.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            path: chapter.archive_path(),
            files,
        }))
    }

    /// Write the archive next to its final path, then move it into place
    pub fn write(&self) -> std::result::Result<(), ArchiveError> {
        if self.files.is_empty() {
            return Err(ArchiveError::NoFiles);
        }
        let partial = partial_path(&self.path);
        match self.write_to(&partial) {
            Ok(()) => {
                fs::rename(&partial, &self.path)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    fn write_to(&self, target: &Path) -> std::result::Result<(), ArchiveError> {
        let mut zip = ZipWriter::new(BufWriter::new(File::create(target)?));
        // images are already compressed
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for file in &self.files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file without a name"))?;
            zip.start_file(name, options)?;
            let mut source = File::open(file)?;
            io::copy(&mut source, &mut zip)?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Regular files in `dir`, ordered by name
fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub struct Archiver;

impl Archiver {
    /// One descriptor per chapter that currently has files on disk
    pub fn plan(series: &Series) -> Result<Vec<ArchiveDescriptor>> {
        let mut descriptors = Vec::new();
        for chapter in &series.chapters {
            let descriptor = ArchiveDescriptor::for_chapter(chapter).map_err(|e| Error::Archive {
                path: chapter.directory.clone(),
                source: ArchiveError::Io(e),
            })?;
            descriptors.extend(descriptor);
        }
        Ok(descriptors)
    }

    /// Archive every chapter with files. The first failure aborts the pass.
    pub async fn archive_series(series: &Series, config: &FetchConfig) -> Result<usize> {
        let descriptors = Self::plan(series)?;
        let tracker = ProgressTracker::start(
            "Zip",
            descriptors.len() as u64,
            config.progress_interval,
            config.show_progress,
        );
        let counter = tracker.counter();

        let mut written = 0;
        for descriptor in descriptors {
            let path = descriptor.path.clone();
            let result = tokio::task::spawn_blocking(move || descriptor.write())
                .await
                .unwrap_or_else(|e| Err(ArchiveError::Io(io::Error::other(e))));
            counter.inc();
            if let Err(source) = result {
                tracker.finish().await;
                return Err(Error::Archive { path, source });
            }
            tracing::debug!(archive = %path.display(), "chapter archived");
            written += 1;
        }

        tracker.finish().await;
        tracing::info!(archives = written, "finished zipping up chapters");
        Ok(written)
    }
}
