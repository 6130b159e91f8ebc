pub mod archive;
pub mod cache;
pub mod config;
pub mod download;
pub mod notify;
pub mod pattern;
pub mod pipeline;
pub mod placeholder;
pub mod placement;
pub mod platform;
pub mod reconcile;
pub mod remote_index;
mod time;
pub mod upload;


pub use archive::{extract_all, ArchiveError, ExtractedArchive};
pub use cache::{CacheKey, ProjectCache, ProjectSnapshot};
pub use config::{
    current_git_branch, find_rule_for, ConfigError, FileRule, SourceRule, SyncConfig,
};
pub use download::DownloadTranslations;
pub use notify::{LogNotifier, Notifier};
pub use pattern::{base_directory, match_sources, MatchedSource, PatternError, SourcePattern};
pub use pipeline::{CancelFlag, RunOutcome, RunPhase, SyncError};
pub use placeholder::{expand, resolve, Language, LanguageMapping, SourceTokens};
pub use placement::PlacementFailure;
pub use platform::http::HttpPlatformClient;
pub use platform::{BuildHandle, BuildStatus, NewSource, PlatformError, RemotePlatform};
pub use reconcile::{ExpectedTranslation, Placement, ReconciliationResult};
pub use remote_index::{
    FullPathIndex, NodeId, RemoteBranch, RemoteDirectory, RemoteFile, RemoteNode,
    StructuralError, TranslationSources,
};
pub use upload::{
    FailedUpload, SourceUploadSummary, UploadSources, UploadSummary, UploadTranslations,
    UploadedSource, UploadedTranslation,
};
