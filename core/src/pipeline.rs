use crate::archive::ArchiveError;
use crate::pattern::PatternError;
use crate::platform::PlatformError;
use crate::remote_index::StructuralError;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Phases of a download run, in order.
///
/// Any phase may short-circuit to [`RunPhase::Cleaned`] on failure or
/// cancellation; the private workspace is removed in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    BuildRequested,
    Building,
    Downloaded,
    Extracted,
    Reconciled,
    Cleaned,
}

impl RunPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BuildRequested => "build requested",
            Self::Building => "building",
            Self::Downloaded => "downloaded",
            Self::Extracted => "extracted",
            Self::Reconciled => "reconciled",
            Self::Cleaned => "cleaned",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Waiting to start.",
            Self::BuildRequested => "Asks the platform to build translations for the branch.",
            Self::Building => "Polls the build until the platform reports it finished.",
            Self::Downloaded => "Fetches the finished archive into the private workspace.",
            Self::Extracted => "Expands the archive next to the downloaded file.",
            Self::Reconciled => {
                "Moves expected translations into place and classifies the leftovers."
            }
            Self::Cleaned => "Removes the workspace and refreshes the project view.",
        }
    }
}

/// Cooperative cancellation shared between a host and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> RunOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Fatal run errors. Per-file problems are never reported through this type.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("malformed remote project: {0}")]
    Structural(#[from] StructuralError),

    #[error("couldn't extract translation archive: {0}")]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't find a source pattern matching {0}")]
    NoMatchingRule(String),
}
