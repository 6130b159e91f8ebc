//! Translation archive extraction.
//!
//! The platform delivers a build as a standard zip container whose entry
//! names always use `/`. Extraction expands every entry below a private
//! directory and records the slash-separated relative path of each file.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use zip::read::ZipArchive;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive not found: {0}")]
    NotFound(String),

    #[error("Archive entry escapes the extraction directory: {0}")]
    UnsafeEntry(String),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Files expanded from a translation archive.
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    root: PathBuf,
    files: BTreeSet<String>,
}

impl ExtractedArchive {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative, slash-separated paths of every extracted file, sorted.
    pub fn files(&self) -> &BTreeSet<String> {
        &self.files
    }

    pub fn contains(&self, archive_path: &str) -> bool {
        self.files.contains(archive_path)
    }

    pub fn absolute(&self, archive_path: &str) -> PathBuf {
        archive_path
            .split('/')
            .fold(self.root.clone(), |dir, component| dir.join(component))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Expands every entry of `archive_path` into `target_dir`.
pub fn extract_all(archive_path: &Path, target_dir: &Path) -> ArchiveResult<ExtractedArchive> {
    if !archive_path.exists() {
        return Err(ArchiveError::NotFound(archive_path.display().to_string()));
    }

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file)?;
    fs::create_dir_all(target_dir)?;

    let mut files = BTreeSet::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let entry_name = entry.name().to_string();
        let relative = entry
            .enclosed_name()
            .map(|path| path.to_path_buf())
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry_name.clone()))?;
        let destination = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&destination)?;
        io::copy(&mut entry, &mut output)?;

        files.insert(slash_path(&relative));
    }

    log::debug!(
        "extracted {} files from {} into {}",
        files.len(),
        archive_path.display(),
        target_dir.display()
    );

    Ok(ExtractedArchive {
        root: target_dir.to_path_buf(),
        files,
    })
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
