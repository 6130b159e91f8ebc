//! Reconciliation of an extracted translation archive against the local
//! project.
//!
//! Every (source, language) pair yields one [`ExpectedTranslation`]. Entries
//! present in the archive are moved into place; every other extracted file
//! is attributed to a remote source through [`TranslationSources`] or left
//! as unknown. The four outcome sets partition the extracted files.

use crate::archive::ExtractedArchive;
use crate::config::SourceRule;
use crate::notify::Notifier;
use crate::pattern::{match_sources, MatchedSource};
use crate::placeholder::{expand, join_paths, Language, LanguageMapping};
use crate::placement::{move_into_place, PlacementFailure};
use crate::remote_index::TranslationSources;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

const KNOWN_HEADER: &str = "Translations exist for sources not covered by the configuration:";
const UNKNOWN_HEADER: &str = "Translations of unknown origin were left out:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedTranslation {
    pub source_relative_path: String,
    pub language_id: String,
    pub expected_local_path: PathBuf,
    pub expected_archive_path: String,
}

/// Expected translations of one matched source for every language.
///
/// Without hierarchy preservation only the file name feeds the template;
/// with it, the path below the base directory does, and the archive path is
/// additionally rooted at the base directory.
pub fn expected_for_source(
    rule: &SourceRule,
    source: &MatchedSource,
    languages: &[Language],
    mapping: &LanguageMapping,
) -> Vec<ExpectedTranslation> {
    let (template_input, archive_prefix) = if rule.preserve_hierarchy {
        (source.path_from_base(), source.base_relative_to_root())
    } else {
        (source.file_name().to_string(), String::new())
    };

    expand(&rule.translation, &template_input, languages, mapping)
        .into_iter()
        .map(|(language, translation)| ExpectedTranslation {
            source_relative_path: source.relative_path.clone(),
            language_id: language.id.clone(),
            expected_local_path: local_path(&source.base_directory, &translation),
            expected_archive_path: join_paths(&[archive_prefix.as_str(), translation.as_str()]),
        })
        .collect()
}

/// Re-matches every rule against `root` and expands all of its sources.
pub fn expected_translations(
    root: &Path,
    rules: &[SourceRule],
    languages: &[Language],
    mapping: &LanguageMapping,
) -> io::Result<Vec<ExpectedTranslation>> {
    let mut expected = Vec::new();
    for rule in rules {
        let sources = match_sources(root, &rule.source)?;
        log::debug!(
            "pattern {} matched {} source(s)",
            rule.source.as_str(),
            sources.len()
        );
        for source in &sources {
            expected.extend(expected_for_source(rule, source, languages, mapping));
        }
    }
    Ok(expected)
}

fn local_path(base: &Path, translation: &str) -> PathBuf {
    translation
        .split('/')
        .filter(|component| !component.is_empty())
        .fold(base.to_path_buf(), |dir, component| dir.join(component))
}

/// A pending move from the extraction directory to the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub archive_path: String,
    pub local_path: PathBuf,
}

/// Expected translations present in the archive, in expectation order.
///
/// Two expectations naming the same archive path collapse into one
/// placement; the later destination wins.
pub fn plan_placements(
    extracted: &ExtractedArchive,
    expected: &[ExpectedTranslation],
) -> Vec<Placement> {
    let mut placements: Vec<Placement> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for translation in expected {
        let archive_path = translation.expected_archive_path.as_str();
        if !extracted.contains(archive_path) {
            log::debug!("{archive_path} not found in archive");
            continue;
        }
        log::debug!(
            "{archive_path} -> {}",
            translation.expected_local_path.display()
        );
        let placement = Placement {
            archive_path: archive_path.to_string(),
            local_path: translation.expected_local_path.clone(),
        };
        match positions.get(archive_path) {
            Some(&position) => placements[position] = placement,
            None => {
                positions.insert(archive_path, placements.len());
                placements.push(placement);
            }
        }
    }
    placements
}

/// Moves every planned file; failures are warned about and collected.
pub fn place_all(
    extracted: &ExtractedArchive,
    placements: Vec<Placement>,
    notifier: &dyn Notifier,
) -> (Vec<Placement>, Vec<PlacementFailure>) {
    let mut placed = Vec::with_capacity(placements.len());
    let mut failed = Vec::new();

    for placement in placements {
        let from = extracted.absolute(&placement.archive_path);
        match move_into_place(&from, &placement.local_path) {
            Ok(()) => placed.push(placement),
            Err(err) => {
                notifier.warn(&format!(
                    "Failed to move {} to {}: {err}",
                    placement.archive_path,
                    placement.local_path.display()
                ));
                failed.push(PlacementFailure {
                    archive_path: placement.archive_path,
                    local_path: placement.local_path,
                    message: err.to_string(),
                });
            }
        }
    }
    (placed, failed)
}

/// Splits the extracted files nobody claimed into those attributable to a
/// remote source (with that source) and those of unknown origin.
pub fn classify_omissions(
    extracted: &ExtractedArchive,
    handled: &HashSet<&str>,
    sources: &TranslationSources,
) -> (BTreeMap<String, String>, BTreeSet<String>) {
    let mut known = BTreeMap::new();
    let mut unknown = BTreeSet::new();
    for path in extracted.files() {
        if handled.contains(path.as_str()) {
            continue;
        }
        match sources.attribute(path) {
            Some(source) => {
                known.insert(path.clone(), source.to_string());
            }
            None => {
                unknown.insert(path.clone());
            }
        }
    }
    (known, unknown)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub placed: Vec<Placement>,
    pub failed: Vec<PlacementFailure>,
    /// Archive path -> remote source path
    pub omitted_known: BTreeMap<String, String>,
    pub omitted_unknown: BTreeSet<String>,
}

impl ReconciliationResult {
    pub fn has_omissions(&self) -> bool {
        !self.omitted_known.is_empty() || !self.omitted_unknown.is_empty()
    }

    /// One human-readable warning covering every omitted file, or `None`
    /// when nothing was left behind.
    pub fn omission_summary(&self) -> Option<String> {
        if !self.has_omissions() {
            return None;
        }

        let mut sections = Vec::new();
        if !self.omitted_known.is_empty() {
            let sources: BTreeSet<&str> =
                self.omitted_known.values().map(String::as_str).collect();
            let mut section = KNOWN_HEADER.to_string();
            for source in sources {
                section.push_str("\n\t- ");
                section.push_str(source);
            }
            sections.push(section);
        }
        if !self.omitted_unknown.is_empty() {
            let mut section = UNKNOWN_HEADER.to_string();
            for path in &self.omitted_unknown {
                section.push_str("\n\t- ");
                section.push_str(path);
            }
            sections.push(section);
        }
        Some(sections.join("\n"))
    }
}

/// Places what was expected and classifies the rest.
pub fn reconcile(
    extracted: &ExtractedArchive,
    expected: &[ExpectedTranslation],
    sources: &TranslationSources,
    notifier: &dyn Notifier,
) -> ReconciliationResult {
    let placements = plan_placements(extracted, expected);
    let (placed, failed) = place_all(extracted, placements, notifier);

    let handled: HashSet<&str> = placed
        .iter()
        .map(|placement| placement.archive_path.as_str())
        .chain(failed.iter().map(|failure| failure.archive_path.as_str()))
        .collect();
    let (omitted_known, omitted_unknown) = classify_omissions(extracted, &handled, sources);

    ReconciliationResult {
        placed,
        failed,
        omitted_known,
        omitted_unknown,
    }
}
