//! Remote project metadata shared between runs.
//!
//! Entries are keyed by configuration name and branch. Hosts own one
//! [`ProjectCache`] and pass it to every run explicitly; a run that changes
//! remote content for a branch outdates that branch when it finishes.

use crate::placeholder::{Language, LanguageMapping};
use crate::platform::{PlatformError, RemotePlatform};
use crate::remote_index::{
    FullPathIndex, RemoteBranch, RemoteDirectory, RemoteFile, StructuralError,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub configuration: String,
    pub branch: Option<String>,
}

impl CacheKey {
    pub fn new(configuration: impl Into<String>, branch: Option<&str>) -> Self {
        Self {
            configuration: configuration.into(),
            branch: branch.map(str::to_string),
        }
    }
}

/// Everything a run needs to know about the remote project for one branch.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    pub branch: Option<RemoteBranch>,
    pub languages: Vec<Language>,
    pub language_mapping: LanguageMapping,
    pub files: Vec<RemoteFile>,
    pub directories: Vec<RemoteDirectory>,
}

impl ProjectSnapshot {
    pub async fn fetch<P: RemotePlatform>(
        platform: &P,
        branch_name: Option<&str>,
    ) -> Result<Self, PlatformError> {
        let branch = match branch_name {
            Some(name) => Some(
                platform
                    .resolve_branch(name)
                    .await?
                    .ok_or_else(|| PlatformError::BranchNotFound(name.to_string()))?,
            ),
            None => None,
        };
        let branch_id = branch.as_ref().map(|branch| branch.id);

        let (languages, language_mapping) = platform.languages_with_mapping().await?;
        let files = platform.list_files(branch_id).await?;
        let directories = platform.list_directories(branch_id).await?;

        log::debug!(
            "fetched project metadata: {} languages, {} files, {} directories",
            languages.len(),
            files.len(),
            directories.len()
        );
        Ok(Self {
            branch,
            languages,
            language_mapping,
            files,
            directories,
        })
    }

    pub fn branch_id(&self) -> Option<u64> {
        self.branch.as_ref().map(|branch| branch.id)
    }

    pub fn index(&self) -> Result<FullPathIndex, StructuralError> {
        FullPathIndex::build_for_branch(&self.files, &self.directories, self.branch_id())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectCache {
    entries: Arc<Mutex<HashMap<CacheKey, Arc<ProjectSnapshot>>>>,
}

impl ProjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<ProjectSnapshot>>> {
        // Entries are plain data, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<ProjectSnapshot>> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, snapshot: ProjectSnapshot) -> Arc<ProjectSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.lock().insert(key, Arc::clone(&snapshot));
        snapshot
    }

    /// Cached snapshot for `key`, fetching it on a miss.
    ///
    /// The lock is not held while fetching; two runs missing the same key
    /// at once both fetch and the later insert wins.
    pub async fn get_or_fetch<P: RemotePlatform>(
        &self,
        key: &CacheKey,
        platform: &P,
    ) -> Result<Arc<ProjectSnapshot>, PlatformError> {
        if let Some(snapshot) = self.get(key) {
            log::debug!("using cached project metadata for {}", describe(key));
            return Ok(snapshot);
        }
        let snapshot = ProjectSnapshot::fetch(platform, key.branch.as_deref()).await?;
        Ok(self.insert(key.clone(), snapshot))
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drops the entries of every configuration for `branch`.
    pub fn outdate_branch(&self, branch: Option<&str>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.branch.as_deref() != branch);
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("outdated {removed} cached snapshot(s) for branch {branch:?}");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn describe(key: &CacheKey) -> String {
    match &key.branch {
        Some(branch) => format!("{}@{branch}", key.configuration),
        None => key.configuration.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::tests::language;
    use crate::platform::fake::FakePlatform;
    use crate::remote_index::NodeId;

    fn platform() -> FakePlatform {
        let mut platform = FakePlatform::new(vec![language("fr", "fr", "fr-FR")]);
        platform.branches = vec![RemoteBranch {
            id: 4,
            name: "main".into(),
        }];
        platform
    }

    #[tokio::test]
    async fn fetches_once_per_key() {
        let platform = platform();
        let cache = ProjectCache::new();
        let key = CacheKey::new("web", Some("main"));

        let first = cache.get_or_fetch(&key, &platform).await.unwrap();
        let second = cache.get_or_fetch(&key, &platform).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.branch_id(), Some(4));

        let listings = platform
            .calls()
            .iter()
            .filter(|call| call.starts_with("list_files"))
            .count();
        assert_eq!(listings, 1);
        assert!(platform.calls().contains(&"list_files:Some(4)".to_string()));
    }

    #[tokio::test]
    async fn unknown_branch_is_an_error() {
        let platform = platform();
        let cache = ProjectCache::new();
        let err = cache
            .get_or_fetch(&CacheKey::new("web", Some("feature")), &platform)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::BranchNotFound(name) if name == "feature"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn outdating_a_branch_spans_configurations() {
        let platform = platform();
        let cache = ProjectCache::new();
        for key in [
            CacheKey::new("web", Some("main")),
            CacheKey::new("app", Some("main")),
            CacheKey::new("app", None),
        ] {
            cache.get_or_fetch(&key, &platform).await.unwrap();
        }

        assert_eq!(cache.outdate_branch(Some("main")), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::new("app", None)).is_some());
        assert!(cache.invalidate(&CacheKey::new("app", None)));
        assert!(!cache.invalidate(&CacheKey::new("app", None)));
    }

    #[test]
    fn fetch_without_branch_lists_the_whole_project() {
        let platform = platform();
        let snapshot = tokio_test::block_on(ProjectSnapshot::fetch(&platform, None)).unwrap();
        assert_eq!(snapshot.branch_id(), None);
        assert_eq!(snapshot.languages.len(), 1);
        assert!(!platform.calls().iter().any(|call| call.starts_with("resolve_branch")));
        assert!(platform.calls().contains(&"list_directories:None".to_string()));
    }

    #[test]
    fn snapshot_index_skips_other_branches() {
        let directory = |id, branch_id| RemoteDirectory {
            id,
            name: "src".into(),
            directory_id: None,
            branch_id,
        };
        let snapshot = ProjectSnapshot {
            branch: Some(RemoteBranch {
                id: 4,
                name: "main".into(),
            }),
            languages: Vec::new(),
            language_mapping: LanguageMapping::new(),
            files: Vec::new(),
            directories: vec![directory(1, Some(4)), directory(2, Some(5))],
        };
        let index = snapshot.index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("src").map(|node| node.id()), Some(NodeId::Directory(1)));
    }

    #[test]
    fn snapshot_builds_index() {
        let snapshot = ProjectSnapshot {
            branch: None,
            languages: Vec::new(),
            language_mapping: LanguageMapping::new(),
            files: vec![RemoteFile {
                id: 1,
                name: "a.json".into(),
                directory_id: None,
                branch_id: None,
                export_pattern: None,
            }],
            directories: Vec::new(),
        };
        assert_eq!(snapshot.index().unwrap().len(), 1);
    }
}
