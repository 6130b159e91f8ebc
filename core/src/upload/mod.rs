//! Uploads of local sources and of their existing translations.
//!
//! Both runs select sources the same way, resolve remote paths against the
//! branch's [`FullPathIndex`](crate::remote_index::FullPathIndex), treat every
//! file as an independent success or failure, and outdate the branch's cached
//! metadata when they finish.

mod sources;
mod translations;

pub use sources::{SourceUploadSummary, UploadSources, UploadedSource};
pub use translations::{UploadSummary, UploadTranslations, UploadedTranslation};

use crate::config::{find_rule_for, SourceRule};
use crate::pattern::{match_sources, MatchedSource};
use crate::pipeline::SyncError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A file the platform did not accept; the rest of the run carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub local_path: PathBuf,
    /// Set for translation uploads
    pub language_id: Option<String>,
    pub reason: String,
}

/// Matched sources per rule, narrowed to `only_file` when one is given.
fn select_sources<'r>(
    root: &Path,
    rules: &'r [SourceRule],
    only_file: Option<&Path>,
) -> Result<Vec<(&'r SourceRule, Vec<MatchedSource>)>, SyncError> {
    let rules: Vec<&SourceRule> = match only_file {
        None => rules.iter().collect(),
        Some(file) => find_rule_for(root, rules, file)
            .map(|rule| vec![rule])
            .ok_or_else(|| SyncError::NoMatchingRule(file.display().to_string()))?,
    };

    let mut selected = Vec::with_capacity(rules.len());
    for rule in rules {
        let mut sources = match_sources(root, &rule.source)?;
        if let Some(file) = only_file {
            sources.retain(|source| source.absolute_path == file);
        }
        selected.push((rule, sources));
    }
    Ok(selected)
}

/// Path of `source` in the remote project.
fn remote_path(rule: &SourceRule, source: &MatchedSource) -> String {
    if rule.preserve_hierarchy {
        source.relative_path.clone()
    } else {
        source.file_name().to_string()
    }
}

/// Remote path as shown to users, prefixed with the branch.
fn display_remote(branch: Option<&str>, path: &str) -> String {
    match branch {
        Some(branch) => format!("{branch}/{path}"),
        None => path.to_string(),
    }
}
