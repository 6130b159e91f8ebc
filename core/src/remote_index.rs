//! Full-path index over the remote project's flat file and directory
//! listings.
//!
//! The platform returns directories and files as flat records pointing at
//! their parent directory. Directory paths are resolved first, walking parent
//! links iteratively with a visited set (a cycle is a [`StructuralError`],
//! never an endless loop) and memoising every resolved directory so shared
//! ancestors are computed once.

use crate::placeholder::{join_paths, resolve, Language, LanguageMapping, SourceTokens};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructuralError {
    #[error("remote directory tree contains a cycle through directory {0}")]
    Cycle(u64),
    #[error("remote {kind} {id} references unknown directory {parent}")]
    UnknownParent {
        kind: &'static str,
        id: u64,
        parent: u64,
    },
    #[error("remote path {0} is used by more than one node")]
    DuplicatePath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub directory_id: Option<u64>,
    #[serde(default)]
    pub branch_id: Option<u64>,
    /// Translation export template configured for this file, if any
    #[serde(default)]
    pub export_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDirectory {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub directory_id: Option<u64>,
    #[serde(default)]
    pub branch_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBranch {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    File(u64),
    Directory(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteNode {
    File(RemoteFile),
    Directory(RemoteDirectory),
}

impl RemoteNode {
    pub fn id(&self) -> NodeId {
        match self {
            Self::File(file) => NodeId::File(file.id),
            Self::Directory(dir) => NodeId::Directory(dir.id),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => &file.name,
            Self::Directory(dir) => &dir.name,
        }
    }

    pub fn as_file(&self) -> Option<&RemoteFile> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }
}

/// Full path → node lookup plus its inverse.
///
/// Paths are slash-separated without a leading slash (`docs/en/strings.json`).
#[derive(Debug, Clone, Default)]
pub struct FullPathIndex {
    by_path: HashMap<String, RemoteNode>,
    by_id: HashMap<NodeId, String>,
}

impl FullPathIndex {
    /// Index of the records outside any branch.
    pub fn build(
        files: &[RemoteFile],
        directories: &[RemoteDirectory],
    ) -> Result<Self, StructuralError> {
        Self::build_for_branch(files, directories, None)
    }

    /// Index of the records belonging to `branch`.
    ///
    /// Paths only have to be unique within a branch, so records of other
    /// branches are skipped. Records without a branch id are kept when a
    /// branch is given: the listing was already scoped to it.
    pub fn build_for_branch(
        files: &[RemoteFile],
        directories: &[RemoteDirectory],
        branch: Option<u64>,
    ) -> Result<Self, StructuralError> {
        let in_branch = |record: Option<u64>| record.is_none() || record == branch;
        let directories: Vec<&RemoteDirectory> = directories
            .iter()
            .filter(|dir| in_branch(dir.branch_id))
            .collect();
        let files: Vec<&RemoteFile> = files
            .iter()
            .filter(|file| in_branch(file.branch_id))
            .collect();

        let directories_by_id: HashMap<u64, &RemoteDirectory> =
            directories.iter().map(|dir| (dir.id, *dir)).collect();
        let mut memo: HashMap<u64, String> = HashMap::with_capacity(directories.len());
        let mut index = Self::default();

        for dir in &directories {
            let path = resolve_directory(dir.id, &directories_by_id, &mut memo)?;
            index.insert(path, RemoteNode::Directory((*dir).clone()))?;
        }

        for file in &files {
            let parent = match file.directory_id {
                Some(parent) => resolve_directory(parent, &directories_by_id, &mut memo)
                    .map_err(|err| match err {
                        StructuralError::UnknownParent { id, .. } if id == parent => {
                            StructuralError::UnknownParent {
                                kind: "file",
                                id: file.id,
                                parent,
                            }
                        }
                        other => other,
                    })?,
                None => String::new(),
            };
            let path = join_paths(&[parent.as_str(), file.name.as_str()]);
            index.insert(path, RemoteNode::File((*file).clone()))?;
        }

        log::debug!(
            "indexed {} remote directories and {} files",
            directories.len(),
            files.len()
        );
        Ok(index)
    }

    fn insert(&mut self, path: String, node: RemoteNode) -> Result<(), StructuralError> {
        if self.by_path.contains_key(&path) {
            return Err(StructuralError::DuplicatePath(path));
        }
        self.by_id.insert(node.id(), path.clone());
        self.by_path.insert(path, node);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&RemoteNode> {
        self.by_path.get(path)
    }

    pub fn file(&self, path: &str) -> Option<&RemoteFile> {
        self.get(path).and_then(RemoteNode::as_file)
    }

    pub fn path_of(&self, id: NodeId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &RemoteFile)> {
        self.by_path
            .iter()
            .filter_map(|(path, node)| node.as_file().map(|file| (path.as_str(), file)))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Precomputes every translation path the remote project can produce.
    ///
    /// Attribution of an unexpected archive entry is a plain lookup in this
    /// table; templates are never inverted.
    pub fn translation_sources(
        &self,
        languages: &[Language],
        mapping: &LanguageMapping,
    ) -> TranslationSources {
        let mut table = HashMap::new();
        let mut files: Vec<(&str, &RemoteFile)> = self.files().collect();
        files.sort_by_key(|(path, _)| *path);

        for (path, file) in files {
            let Some(pattern) = file.export_pattern.as_deref() else {
                continue;
            };
            let tokens = SourceTokens::from_path(path);
            for language in languages {
                let translation = resolve(pattern, &tokens, language, mapping);
                table.insert(translation, path.to_string());
            }
        }

        TranslationSources { table }
    }
}

fn resolve_directory(
    id: u64,
    directories: &HashMap<u64, &RemoteDirectory>,
    memo: &mut HashMap<u64, String>,
) -> Result<String, StructuralError> {
    if let Some(path) = memo.get(&id) {
        return Ok(path.clone());
    }

    // Climb until a memoised ancestor or the root, then unwind.
    let mut chain: Vec<&RemoteDirectory> = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(id);
    let mut prefix = String::new();

    while let Some(current) = cursor {
        if let Some(path) = memo.get(&current) {
            prefix = path.clone();
            break;
        }
        if !visited.insert(current) {
            return Err(StructuralError::Cycle(current));
        }
        let dir = directories.get(&current).copied().ok_or_else(|| {
            let child = chain.last().map(|dir| dir.id).unwrap_or(current);
            StructuralError::UnknownParent {
                kind: "directory",
                id: child,
                parent: current,
            }
        })?;
        chain.push(dir);
        cursor = dir.directory_id;
    }

    for dir in chain.into_iter().rev() {
        prefix = join_paths(&[prefix.as_str(), dir.name.as_str()]);
        memo.insert(dir.id, prefix.clone());
    }
    Ok(prefix)
}

/// Translation path → remote source path, for every known file × language.
#[derive(Debug, Clone, Default)]
pub struct TranslationSources {
    table: HashMap<String, String>,
}

impl TranslationSources {
    pub fn attribute(&self, translation_path: &str) -> Option<&str> {
        self.table.get(translation_path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
