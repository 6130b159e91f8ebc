//! Remote localization platform contract.
//!
//! The engine only needs the operations below; [`http::HttpPlatformClient`]
//! implements them over the platform's REST API.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use crate::placeholder::{Language, LanguageMapping};
use crate::remote_index::{RemoteBranch, RemoteDirectory, RemoteFile};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

pub use reqwest::Url;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected platform response: {0}")]
    Decode(String),
    #[error("branch {0} does not exist in the remote project")]
    BranchNotFound(String),
    #[error("translation build {0} failed on the platform")]
    BuildFailed(u64),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Finished,
    Failed,
}

impl BuildStatus {
    /// Maps the platform's status strings; anything unfinished is pending.
    pub fn from_remote(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "finished" => Self::Finished,
            "failed" | "canceled" | "cancelled" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHandle {
    pub id: u64,
    pub status: BuildStatus,
}

/// A local source file to be added to the remote project.
#[derive(Debug, Clone, Copy)]
pub struct NewSource<'a> {
    pub path: &'a Path,
    /// Remote file name
    pub name: &'a str,
    pub directory_id: Option<u64>,
    pub branch_id: Option<u64>,
    /// Where the platform places this file's translations in exported archives
    pub export_pattern: &'a str,
}

#[allow(async_fn_in_trait)]
pub trait RemotePlatform {
    async fn start_build(&self, branch_id: Option<u64>) -> Result<BuildHandle, PlatformError>;

    async fn poll_build(&self, build: &BuildHandle) -> Result<BuildHandle, PlatformError>;

    async fn download_url(&self, build: &BuildHandle) -> Result<Url, PlatformError>;

    /// Writes the resource at `url` to `destination`.
    async fn download_to(&self, url: &Url, destination: &Path) -> Result<(), PlatformError>;

    async fn list_files(&self, branch_id: Option<u64>) -> Result<Vec<RemoteFile>, PlatformError>;

    async fn list_directories(
        &self,
        branch_id: Option<u64>,
    ) -> Result<Vec<RemoteDirectory>, PlatformError>;

    async fn list_languages(&self) -> Result<Vec<Language>, PlatformError>;

    async fn language_mapping(&self) -> Result<LanguageMapping, PlatformError>;

    /// Target languages and the language mapping together, for clients that
    /// can read both from one response.
    async fn languages_with_mapping(
        &self,
    ) -> Result<(Vec<Language>, LanguageMapping), PlatformError> {
        Ok((self.list_languages().await?, self.language_mapping().await?))
    }

    async fn resolve_branch(&self, name: &str) -> Result<Option<RemoteBranch>, PlatformError>;

    async fn upload_translation(
        &self,
        path: &Path,
        file_id: u64,
        language_id: &str,
    ) -> Result<(), PlatformError>;

    /// Adds a new source file and returns its remote record.
    async fn upload_source(&self, source: NewSource<'_>) -> Result<RemoteFile, PlatformError>;

    /// Replaces the content of an existing source file.
    async fn update_source(&self, path: &Path, file_id: u64) -> Result<(), PlatformError>;

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<u64>,
        branch_id: Option<u64>,
    ) -> Result<RemoteDirectory, PlatformError>;
}
