//! In-memory platform for engine tests.

use super::{BuildHandle, BuildStatus, NewSource, PlatformError, RemotePlatform, Url};
use crate::pipeline::CancelFlag;
use crate::placeholder::{Language, LanguageMapping};
use crate::remote_index::{RemoteBranch, RemoteDirectory, RemoteFile};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct FakePlatform {
    pub files: Vec<RemoteFile>,
    pub directories: Vec<RemoteDirectory>,
    pub languages: Vec<Language>,
    pub mapping: LanguageMapping,
    pub branches: Vec<RemoteBranch>,
    /// Zip served by `download_to`
    pub archive: Option<PathBuf>,
    /// Number of polls answered with `Pending` before `Finished`
    pub polls_until_finished: usize,
    pub fail_build: bool,
    /// Cancelled on the first poll, simulating a user abort mid-build
    pub cancel_on_poll: Option<CancelFlag>,
    /// Uploads of these file names answer with a server error
    pub failing_uploads: HashSet<String>,
    polls: AtomicUsize,
    next_id: AtomicUsize,
    calls: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(PathBuf, u64, String)>>,
}

impl FakePlatform {
    pub(crate) fn new(languages: Vec<Language>) -> Self {
        Self {
            languages,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn uploads(&self) -> Vec<(PathBuf, u64, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    fn fails(&self, path: &Path) -> Result<(), PlatformError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing_uploads.contains(&name) {
            return Err(PlatformError::Status {
                status: 500,
                body: format!("rejected {name}"),
            });
        }
        Ok(())
    }

    /// Ids for created records, clear of the ids used in fixtures.
    fn next_id(&self) -> u64 {
        1000 + self.next_id.fetch_add(1, Ordering::SeqCst) as u64
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl RemotePlatform for FakePlatform {
    async fn start_build(&self, branch_id: Option<u64>) -> Result<BuildHandle, PlatformError> {
        self.record(format!("start_build:{branch_id:?}"));
        Ok(BuildHandle {
            id: 1,
            status: BuildStatus::Pending,
        })
    }

    async fn poll_build(&self, build: &BuildHandle) -> Result<BuildHandle, PlatformError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(flag) = &self.cancel_on_poll {
            flag.cancel();
        }
        let status = if self.fail_build {
            BuildStatus::Failed
        } else if poll > self.polls_until_finished {
            BuildStatus::Finished
        } else {
            BuildStatus::Pending
        };
        Ok(BuildHandle {
            id: build.id,
            status,
        })
    }

    async fn download_url(&self, build: &BuildHandle) -> Result<Url, PlatformError> {
        self.record("download_url");
        Url::parse(&format!("https://fake.invalid/builds/{}.zip", build.id))
            .map_err(|err| PlatformError::Decode(err.to_string()))
    }

    async fn download_to(&self, _url: &Url, destination: &Path) -> Result<(), PlatformError> {
        self.record("download_to");
        match &self.archive {
            Some(archive) => {
                fs::copy(archive, destination)?;
                Ok(())
            }
            None => Err(PlatformError::Status {
                status: 404,
                body: "no archive".into(),
            }),
        }
    }

    async fn list_files(&self, branch_id: Option<u64>) -> Result<Vec<RemoteFile>, PlatformError> {
        self.record(format!("list_files:{branch_id:?}"));
        Ok(self.files.clone())
    }

    async fn list_directories(
        &self,
        branch_id: Option<u64>,
    ) -> Result<Vec<RemoteDirectory>, PlatformError> {
        self.record(format!("list_directories:{branch_id:?}"));
        Ok(self.directories.clone())
    }

    async fn list_languages(&self) -> Result<Vec<Language>, PlatformError> {
        self.record("list_languages");
        Ok(self.languages.clone())
    }

    async fn language_mapping(&self) -> Result<LanguageMapping, PlatformError> {
        Ok(self.mapping.clone())
    }

    async fn resolve_branch(&self, name: &str) -> Result<Option<RemoteBranch>, PlatformError> {
        self.record(format!("resolve_branch:{name}"));
        Ok(self.branches.iter().find(|branch| branch.name == name).cloned())
    }

    async fn upload_translation(
        &self,
        path: &Path,
        file_id: u64,
        language_id: &str,
    ) -> Result<(), PlatformError> {
        self.record(format!("upload_translation:{file_id}:{language_id}"));
        self.fails(path)?;
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), file_id, language_id.to_string()));
        Ok(())
    }

    async fn upload_source(&self, source: NewSource<'_>) -> Result<RemoteFile, PlatformError> {
        self.record(format!(
            "upload_source:{}:{:?}:{:?}:{}",
            source.name, source.directory_id, source.branch_id, source.export_pattern
        ));
        self.fails(source.path)?;
        Ok(RemoteFile {
            id: self.next_id(),
            name: source.name.to_string(),
            directory_id: source.directory_id,
            branch_id: source.branch_id,
            export_pattern: Some(source.export_pattern.to_string()),
        })
    }

    async fn update_source(&self, path: &Path, file_id: u64) -> Result<(), PlatformError> {
        self.record(format!("update_source:{file_id}"));
        self.fails(path)
    }

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<u64>,
        branch_id: Option<u64>,
    ) -> Result<RemoteDirectory, PlatformError> {
        self.record(format!("create_directory:{name}:{parent_id:?}:{branch_id:?}"));
        Ok(RemoteDirectory {
            id: self.next_id(),
            name: name.to_string(),
            directory_id: parent_id,
            branch_id,
        })
    }
}
