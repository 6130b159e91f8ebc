/// Source pattern matching against a local project tree
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("source pattern is empty")]
    Empty,
    #[error("invalid source pattern {pattern}: {reason}")]
    Invalid { pattern: String, reason: String },
}

#[derive(Debug, Clone)]
enum PatternSegment {
    Literal(String),
    Wildcard(Regex),
    /// `**`: zero or more whole path segments
    AnyDepth,
}

impl PatternSegment {
    fn parse(raw: &str, pattern: &str) -> Result<Self, PatternError> {
        if raw == "**" {
            return Ok(Self::AnyDepth);
        }
        if !raw.contains(['*', '?']) {
            return Ok(Self::Literal(raw.to_string()));
        }

        let mut expr = String::from("^");
        for ch in raw.chars() {
            match ch {
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        Regex::new(&expr)
            .map(Self::Wildcard)
            .map_err(|err| PatternError::Invalid {
                pattern: pattern.to_string(),
                reason: err.to_string(),
            })
    }

    fn matches(&self, component: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == component,
            Self::Wildcard(regex) => regex.is_match(component),
            Self::AnyDepth => true,
        }
    }
}

/// A compiled source glob.
///
/// Supports literal segments, `*` / `?` inside a segment and `**` spanning
/// any number of segments. Matching is case-sensitive and always relative to
/// the project root; a leading `/` or `./` is ignored.
#[derive(Debug, Clone)]
pub struct SourcePattern {
    raw: String,
    segments: Vec<PatternSegment>,
}

impl SourcePattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let normalized = raw.replace('\\', "/");
        let segments = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(|segment| PatternSegment::parse(segment, raw))
            .collect::<Result<Vec<_>, _>>()?;

        if segments.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks a slash-separated path relative to the root.
    pub fn matches(&self, relative_path: &str) -> bool {
        let components: Vec<&str> = relative_path
            .split('/')
            .filter(|component| !component.is_empty())
            .collect();
        match_segments(&self.segments, &components)
    }

    fn has_any_depth(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, PatternSegment::AnyDepth))
    }

    /// Leading literal directory segments; every match lives below them.
    fn literal_prefix(&self) -> Vec<&str> {
        let dir_segments = &self.segments[..self.segments.len() - 1];
        dir_segments
            .iter()
            .map_while(|segment| match segment {
                PatternSegment::Literal(literal) => Some(literal.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of leading components of a match that belong to its base
    /// directory.
    fn base_depth(&self, component_count: usize) -> usize {
        let any_depth = self
            .segments
            .iter()
            .position(|segment| matches!(segment, PatternSegment::AnyDepth));
        match any_depth {
            Some(index) => index.min(component_count.saturating_sub(1)),
            None => component_count.saturating_sub(1),
        }
    }
}

fn match_segments(segments: &[PatternSegment], components: &[&str]) -> bool {
    match segments.split_first() {
        None => components.is_empty(),
        Some((PatternSegment::AnyDepth, rest)) => {
            (0..=components.len()).any(|skip| match_segments(rest, &components[skip..]))
        }
        Some((segment, rest)) => match components.split_first() {
            Some((component, remaining)) => {
                segment.matches(component) && match_segments(rest, remaining)
            }
            None => false,
        },
    }
}

/// A local file selected by a source pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSource {
    pub absolute_path: PathBuf,
    pub base_directory: PathBuf,
    /// Slash-separated path relative to the project root
    pub relative_path: String,
}

impl MatchedSource {
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// Path of the source relative to its base directory.
    pub fn path_from_base(&self) -> String {
        let depth = self.base_components();
        self.relative_path
            .split('/')
            .skip(depth)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Base directory relative to the project root (empty for the root).
    pub fn base_relative_to_root(&self) -> String {
        let depth = self.base_components();
        self.relative_path
            .split('/')
            .take(depth)
            .collect::<Vec<_>>()
            .join("/")
    }

    fn base_components(&self) -> usize {
        let total = self.relative_path.split('/').count();
        let below_base = self
            .absolute_path
            .strip_prefix(&self.base_directory)
            .map(|rest| rest.components().count())
            .unwrap_or(1);
        total.saturating_sub(below_base)
    }
}

/// Deepest pattern-invariant ancestor of a match.
pub fn base_directory(root: &Path, relative_path: &str, pattern: &SourcePattern) -> PathBuf {
    let components: Vec<&str> = relative_path
        .split('/')
        .filter(|component| !component.is_empty())
        .collect();
    let depth = pattern.base_depth(components.len());
    components[..depth]
        .iter()
        .fold(root.to_path_buf(), |dir, component| dir.join(component))
}

/// Resolves `pattern` against `root`.
///
/// Directories are visited depth-first with entries sorted by name, so the
/// result order is stable for an unchanged tree. No match is not an error.
pub fn match_sources(root: &Path, pattern: &SourcePattern) -> io::Result<Vec<MatchedSource>> {
    let prefix = pattern.literal_prefix();
    let start = prefix
        .iter()
        .fold(root.to_path_buf(), |dir, component| dir.join(component));
    if !start.is_dir() {
        log::debug!(
            "pattern {} has no matches: {} is not a directory",
            pattern.as_str(),
            start.display()
        );
        return Ok(Vec::new());
    }

    let max_depth = if pattern.has_any_depth() {
        None
    } else {
        Some(pattern.segments.len())
    };

    let mut matches = Vec::new();
    walk(
        root,
        &start,
        prefix.len(),
        max_depth,
        pattern,
        &mut matches,
    )?;
    Ok(matches)
}

fn walk(
    root: &Path,
    current: &Path,
    depth: usize,
    max_depth: Option<usize>,
    pattern: &SourcePattern,
    matches: &mut Vec<MatchedSource>,
) -> io::Result<()> {
    let mut entries = fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if max_depth.map_or(true, |max| depth + 1 < max) {
                walk(root, &path, depth + 1, max_depth, pattern, matches)?;
            }
            continue;
        }
        if !path.is_file() {
            continue;
        }

        let Some(relative_path) = relative_slash_path(root, &path) else {
            continue;
        };
        if pattern.matches(&relative_path) {
            let base_directory = base_directory(root, &relative_path, pattern);
            matches.push(MatchedSource {
                absolute_path: path,
                base_directory,
                relative_path,
            });
        }
    }
    Ok(())
}

/// Slash-separated form of `path` relative to `root`.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
