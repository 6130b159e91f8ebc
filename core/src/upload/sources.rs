//! Upload of local source files.
//!
//! A source already present at its remote path is updated in place; any
//! other source is added, creating the remote directories above it first
//! when hierarchy is preserved. New sources get an export pattern that puts
//! their translations where a download run expects them.

use super::{display_remote, remote_path, select_sources, FailedUpload};
use crate::cache::{CacheKey, ProjectCache};
use crate::config::{ConfigError, SourceRule, SyncConfig};
use crate::notify::{Notifier, LOG_NOTIFIER};
use crate::pattern::MatchedSource;
use crate::pipeline::{CancelFlag, RunOutcome, SyncError};
use crate::placeholder::join_paths;
use crate::platform::{NewSource, PlatformError, RemotePlatform};
use crate::remote_index::{FullPathIndex, RemoteNode};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedSource {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub file_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUploadSummary {
    pub updated: Vec<UploadedSource>,
    pub created: Vec<UploadedSource>,
    pub created_directories: Vec<String>,
    pub failed: Vec<FailedUpload>,
}

/// The branch a run uploads into.
#[derive(Clone, Copy)]
struct Target<'a> {
    index: &'a FullPathIndex,
    branch_id: Option<u64>,
}

/// Remote nodes added during a run, on top of the branch's index.
#[derive(Default)]
struct Created {
    directories: HashMap<String, u64>,
    files: HashMap<String, u64>,
}

pub struct UploadSources<'a, P> {
    platform: &'a P,
    cache: &'a ProjectCache,
    key: CacheKey,
    root: PathBuf,
    rules: Vec<SourceRule>,
    only_file: Option<PathBuf>,
    notifier: &'a dyn Notifier,
    cancel: CancelFlag,
}

impl<'a, P: RemotePlatform> UploadSources<'a, P> {
    pub fn new(
        platform: &'a P,
        cache: &'a ProjectCache,
        key: CacheKey,
        root: impl Into<PathBuf>,
        rules: Vec<SourceRule>,
    ) -> Self {
        Self {
            platform,
            cache,
            key,
            root: root.into(),
            rules,
            only_file: None,
            notifier: &LOG_NOTIFIER,
            cancel: CancelFlag::new(),
        }
    }

    pub fn from_config(
        platform: &'a P,
        cache: &'a ProjectCache,
        config: &SyncConfig,
        current_branch: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let branch = config.branch_name(current_branch);
        let key = CacheKey::new(&config.name, branch.as_deref());
        Ok(Self::new(platform, cache, key, &config.base_path, config.rules()?))
    }

    /// Uploads only this source file, using the first rule that selects it.
    pub fn only_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.only_file = Some(file.into());
        self
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Uploads sources and outdates the branch's cached metadata, whether or
    /// not every upload succeeded.
    pub async fn process(&self) -> Result<RunOutcome<SourceUploadSummary>, SyncError> {
        let outcome = self.run().await;
        self.cache.outdate_branch(self.key.branch.as_deref());

        match &outcome {
            Ok(RunOutcome::Completed(summary)) => self.notifier.info(&format!(
                "Sources: {} updated, {} added, {} failed",
                summary.updated.len(),
                summary.created.len(),
                summary.failed.len()
            )),
            Ok(RunOutcome::Cancelled) => {}
            Err(err) => self.notifier.error(&err.to_string()),
        }
        outcome
    }

    async fn run(&self) -> Result<RunOutcome<SourceUploadSummary>, SyncError> {
        let selected = select_sources(&self.root, &self.rules, self.only_file.as_deref())?;
        let snapshot = self.cache.get_or_fetch(&self.key, self.platform).await?;
        let index = snapshot.index()?;
        let branch_id = snapshot.branch_id();
        let mut created = Created::default();
        let mut summary = SourceUploadSummary::default();

        for (rule, sources) in selected {
            for source in &sources {
                if self.cancel.is_cancelled() {
                    self.notifier.debug("source upload cancelled");
                    return Ok(RunOutcome::Cancelled);
                }
                let remote_path = remote_path(rule, source);
                let existing = match index.get(&remote_path) {
                    Some(RemoteNode::File(file)) => Some(file.id),
                    Some(RemoteNode::Directory(_)) => {
                        self.fail(&mut summary, source, &remote_path, "a directory has that path");
                        continue;
                    }
                    None => created.files.get(&remote_path).copied(),
                };

                let result = match existing {
                    Some(file_id) => self
                        .platform
                        .update_source(&source.absolute_path, file_id)
                        .await
                        .map(|()| (file_id, false)),
                    None => {
                        let target = Target {
                            index: &index,
                            branch_id,
                        };
                        self.add(rule, source, &remote_path, target, &mut created, &mut summary)
                            .await
                            .map(|file_id| (file_id, true))
                    }
                };

                match result {
                    Ok((file_id, added)) => {
                        let uploaded = UploadedSource {
                            local_path: source.absolute_path.clone(),
                            remote_path,
                            file_id,
                        };
                        if added {
                            created.files.insert(uploaded.remote_path.clone(), file_id);
                            summary.created.push(uploaded);
                        } else {
                            summary.updated.push(uploaded);
                        }
                    }
                    Err(err) => self.fail(&mut summary, source, &remote_path, &err.to_string()),
                }
            }
        }

        Ok(RunOutcome::Completed(summary))
    }

    async fn add(
        &self,
        rule: &SourceRule,
        source: &MatchedSource,
        remote_path: &str,
        target: Target<'_>,
        created: &mut Created,
        summary: &mut SourceUploadSummary,
    ) -> Result<u64, PlatformError> {
        let (parent, name) = match remote_path.rsplit_once('/') {
            Some((parent, name)) => (Some(parent), name),
            None => (None, remote_path),
        };
        let directory_id = match parent {
            Some(parent) => Some(
                self.ensure_directory(parent, target, created, summary)
                    .await?,
            ),
            None => None,
        };

        let file = self
            .platform
            .upload_source(NewSource {
                path: &source.absolute_path,
                name,
                directory_id,
                branch_id: target.branch_id,
                export_pattern: &export_pattern(rule, source),
            })
            .await?;
        Ok(file.id)
    }

    /// Id of the remote directory at `path`, creating missing ancestors.
    async fn ensure_directory(
        &self,
        path: &str,
        target: Target<'_>,
        created: &mut Created,
        summary: &mut SourceUploadSummary,
    ) -> Result<u64, PlatformError> {
        let mut parent_id = None;
        let mut current = String::new();
        for name in path.split('/') {
            current = join_paths(&[current.as_str(), name]);
            let known = match target.index.get(&current) {
                Some(RemoteNode::Directory(dir)) => Some(dir.id),
                Some(RemoteNode::File(_)) => {
                    return Err(PlatformError::Decode(format!(
                        "remote path {current} is a file, not a directory"
                    )));
                }
                None => created.directories.get(&current).copied(),
            };
            let id = match known {
                Some(id) => id,
                None => {
                    let dir = self
                        .platform
                        .create_directory(name, parent_id, target.branch_id)
                        .await?;
                    self.notifier.debug(&format!("created remote directory {current}"));
                    created.directories.insert(current.clone(), dir.id);
                    summary.created_directories.push(current.clone());
                    dir.id
                }
            };
            parent_id = Some(id);
        }
        parent_id.ok_or_else(|| PlatformError::Decode(format!("empty directory path {path:?}")))
    }

    fn fail(
        &self,
        summary: &mut SourceUploadSummary,
        source: &MatchedSource,
        remote_path: &str,
        reason: &str,
    ) {
        let shown = display_remote(self.key.branch.as_deref(), remote_path);
        self.notifier
            .warn(&format!("Couldn't upload source {shown}: {reason}"));
        summary.failed.push(FailedUpload {
            local_path: source.absolute_path.clone(),
            language_id: None,
            reason: reason.to_string(),
        });
    }
}

/// Export pattern for a new source, rooted the way download runs expect its
/// translations in the archive.
fn export_pattern(rule: &SourceRule, source: &MatchedSource) -> String {
    let prefix = if rule.preserve_hierarchy {
        source.base_relative_to_root()
    } else {
        String::new()
    };
    format!("/{}", join_paths(&[prefix.as_str(), rule.translation.as_str()]))
}
