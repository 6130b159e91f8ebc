//! Build, download and reconcile translations for one configuration group.

use crate::archive::extract_all;
use crate::cache::{CacheKey, ProjectCache};
use crate::config::{ConfigError, SourceRule, SyncConfig};
use crate::notify::{Notifier, LOG_NOTIFIER};
use crate::pipeline::{CancelFlag, RunOutcome, RunPhase, SyncError};
use crate::platform::{BuildStatus, PlatformError, RemotePlatform};
use crate::reconcile::{expected_translations, reconcile, ReconciliationResult};
use crate::time::run_token;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ARCHIVE_FILE: &str = "translations.zip";
const EXTRACTION_DIR: &str = "all";

/// Private per-run directory, removed when dropped.
#[derive(Debug)]
struct RunWorkspace {
    dir: PathBuf,
}

impl RunWorkspace {
    fn create(temp_root: &Path) -> io::Result<Self> {
        let dir = temp_root.join(format!("locsync-{}", run_token()));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn archive(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    fn extraction_dir(&self) -> PathBuf {
        self.dir.join(EXTRACTION_DIR)
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => log::debug!("removed run workspace {}", self.dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => log::warn!(
                "Failed to remove run workspace {}: {err}",
                self.dir.display()
            ),
        }
    }
}

/// One download run.
///
/// The run requests a build, polls it until the platform reports it
/// finished, downloads and extracts the archive into a private workspace and
/// moves every expected translation into the project. The workspace is
/// removed on every exit path before [`DownloadTranslations::process`]
/// returns.
pub struct DownloadTranslations<'a, P> {
    platform: &'a P,
    cache: &'a ProjectCache,
    key: CacheKey,
    root: PathBuf,
    rules: Vec<SourceRule>,
    notifier: &'a dyn Notifier,
    cancel: CancelFlag,
    poll_interval: Duration,
    temp_root: PathBuf,
}

impl<'a, P: RemotePlatform> DownloadTranslations<'a, P> {
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
            notifier: &LOG_NOTIFIER,
            cancel: CancelFlag::new(),
            poll_interval: Duration::from_secs(1),
            temp_root: std::env::temp_dir(),
        }
    }

    /// Run for a configuration group on `current_branch` (ignored when the
    /// group disables branches).
    pub fn from_config(
        platform: &'a P,
        cache: &'a ProjectCache,
        config: &SyncConfig,
        current_branch: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let branch = config.branch_name(current_branch);
        let key = CacheKey::new(&config.name, branch.as_deref());
        Ok(Self::new(platform, cache, key, &config.base_path, config.rules()?)
            .with_poll_interval(config.poll_interval()))
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Directory under which the per-run workspace is created.
    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub async fn process(&self) -> Result<RunOutcome<ReconciliationResult>, SyncError> {
        let workspace = RunWorkspace::create(&self.temp_root)?;
        let outcome = self.run(&workspace).await;
        drop(workspace);
        self.notifier.debug(RunPhase::Cleaned.description());
        self.notifier.refresh(&self.root);

        match &outcome {
            Ok(RunOutcome::Completed(result)) => {
                if let Some(summary) = result.omission_summary() {
                    self.notifier.warn(&summary);
                }
                self.notifier.info(&format!(
                    "Placed {} translation file(s) under {}",
                    result.placed.len(),
                    self.root.display()
                ));
            }
            Ok(RunOutcome::Cancelled) => {}
            Err(err) => self.notifier.error(&err.to_string()),
        }
        outcome
    }

    async fn run(
        &self,
        workspace: &RunWorkspace,
    ) -> Result<RunOutcome<ReconciliationResult>, SyncError> {
        for rule in &self.rules {
            self.notifier.debug(&format!(
                "source pattern {} -> translation pattern {}",
                rule.source.as_str(),
                rule.translation
            ));
        }

        let snapshot = self.cache.get_or_fetch(&self.key, self.platform).await?;
        // A malformed remote tree aborts the run before anything is built.
        let index = snapshot.index()?;
        if self.cancelled(RunPhase::Idle) {
            return Ok(RunOutcome::Cancelled);
        }

        self.enter(RunPhase::BuildRequested);
        let mut build = self.platform.start_build(snapshot.branch_id()).await?;

        let mut phase = self.enter(RunPhase::Building);
        loop {
            match build.status {
                BuildStatus::Finished => break,
                BuildStatus::Failed => return Err(PlatformError::BuildFailed(build.id).into()),
                BuildStatus::Pending => {}
            }
            if self.cancelled(phase) {
                return Ok(RunOutcome::Cancelled);
            }
            tokio::time::sleep(self.poll_interval).await;
            build = self.platform.poll_build(&build).await?;
        }
        if self.cancelled(phase) {
            return Ok(RunOutcome::Cancelled);
        }

        let url = self.platform.download_url(&build).await?;
        let archive = workspace.archive();
        self.platform.download_to(&url, &archive).await?;
        phase = self.enter(RunPhase::Downloaded);
        if self.cancelled(phase) {
            return Ok(RunOutcome::Cancelled);
        }

        let extracted = extract_all(&archive, &workspace.extraction_dir())?;
        phase = self.enter(RunPhase::Extracted);
        if self.cancelled(phase) {
            return Ok(RunOutcome::Cancelled);
        }

        let sources = index.translation_sources(&snapshot.languages, &snapshot.language_mapping);
        let expected = expected_translations(
            &self.root,
            &self.rules,
            &snapshot.languages,
            &snapshot.language_mapping,
        )?;
        let result = reconcile(&extracted, &expected, &sources, self.notifier);
        self.enter(RunPhase::Reconciled);

        Ok(RunOutcome::Completed(result))
    }

    fn enter(&self, phase: RunPhase) -> RunPhase {
        self.notifier
            .debug(&format!("{}: {}", phase.label(), phase.description()));
        phase
    }

    fn cancelled(&self, phase: RunPhase) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            self.notifier
                .debug(&format!("run cancelled while {}", phase.label()));
        }
        cancelled
    }
}
