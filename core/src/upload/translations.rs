//! Upload of existing local translations for remote sources.

use super::{display_remote, remote_path, select_sources, FailedUpload};
use crate::cache::{CacheKey, ProjectCache};
use crate::config::{ConfigError, SourceRule, SyncConfig};
use crate::notify::{Notifier, LOG_NOTIFIER};
use crate::pipeline::{CancelFlag, RunOutcome, SyncError};
use crate::platform::RemotePlatform;
use crate::reconcile::expected_for_source;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedTranslation {
    pub local_path: PathBuf,
    pub file_id: u64,
    pub language_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub uploaded: Vec<UploadedTranslation>,
    pub failed: Vec<FailedUpload>,
    /// Local sources with no remote counterpart, prefixed with the branch
    pub missing_sources: Vec<String>,
}

pub struct UploadTranslations<'a, P> {
    platform: &'a P,
    cache: &'a ProjectCache,
    key: CacheKey,
    root: PathBuf,
    rules: Vec<SourceRule>,
    only_file: Option<PathBuf>,
    notifier: &'a dyn Notifier,
    cancel: CancelFlag,
}

impl<'a, P: RemotePlatform> UploadTranslations<'a, P> {
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

    /// Restricts the run to the translations of a single source file.
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

    /// Uploads translations and outdates the branch's cached metadata,
    /// whether or not every upload succeeded.
    pub async fn process(&self) -> Result<RunOutcome<UploadSummary>, SyncError> {
        let outcome = self.run().await;
        self.cache.outdate_branch(self.key.branch.as_deref());

        match &outcome {
            Ok(RunOutcome::Completed(summary)) if summary.failed.is_empty() => {
                self.notifier.info(&format!(
                    "Uploaded {} translation file(s)",
                    summary.uploaded.len()
                ))
            }
            Ok(RunOutcome::Completed(summary)) => self.notifier.info(&format!(
                "Uploaded {} translation file(s), {} failed",
                summary.uploaded.len(),
                summary.failed.len()
            )),
            Ok(RunOutcome::Cancelled) => {}
            Err(err) => self.notifier.error(&err.to_string()),
        }
        outcome
    }

    async fn run(&self) -> Result<RunOutcome<UploadSummary>, SyncError> {
        let selected = select_sources(&self.root, &self.rules, self.only_file.as_deref())?;
        let snapshot = self.cache.get_or_fetch(&self.key, self.platform).await?;
        let index = snapshot.index()?;
        let mut summary = UploadSummary::default();

        for (rule, sources) in selected {
            for source in &sources {
                let remote_path = remote_path(rule, source);
                let Some(remote) = index.file(&remote_path) else {
                    let missing = display_remote(self.key.branch.as_deref(), &remote_path);
                    self.notifier
                        .warn(&format!("Source file {missing} is missing in the remote project"));
                    summary.missing_sources.push(missing);
                    continue;
                };

                let expected = expected_for_source(
                    rule,
                    source,
                    &snapshot.languages,
                    &snapshot.language_mapping,
                );
                for translation in expected {
                    if self.cancel.is_cancelled() {
                        self.notifier.debug("upload cancelled");
                        return Ok(RunOutcome::Cancelled);
                    }
                    if !translation.expected_local_path.is_file() {
                        self.notifier.debug(&format!(
                            "no {} translation at {}",
                            translation.language_id,
                            translation.expected_local_path.display()
                        ));
                        continue;
                    }

                    let uploaded = self
                        .platform
                        .upload_translation(
                            &translation.expected_local_path,
                            remote.id,
                            &translation.language_id,
                        )
                        .await;
                    match uploaded {
                        Ok(()) => summary.uploaded.push(UploadedTranslation {
                            local_path: translation.expected_local_path,
                            file_id: remote.id,
                            language_id: translation.language_id,
                        }),
                        Err(err) => {
                            self.notifier.warn(&format!(
                                "Couldn't upload {} translation {}: {err}",
                                translation.language_id,
                                translation.expected_local_path.display()
                            ));
                            summary.failed.push(FailedUpload {
                                local_path: translation.expected_local_path,
                                language_id: Some(translation.language_id),
                                reason: err.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Ok(RunOutcome::Completed(summary))
    }
}
