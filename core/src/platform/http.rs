//! REST client for the Crowdin v2 API.

use super::{BuildHandle, BuildStatus, NewSource, PlatformError, RemotePlatform, Url};
use crate::placeholder::{Language, LanguageMapping};
use crate::remote_index::{RemoteBranch, RemoteDirectory, RemoteFile};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 500;
const FILE_NAME_HEADER: &str = "Crowdin-API-FileName";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope<T> {
    data: Vec<Envelope<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileRecord {
    id: u64,
    name: String,
    #[serde(default)]
    directory_id: Option<u64>,
    #[serde(default)]
    branch_id: Option<u64>,
    #[serde(default)]
    export_options: Option<ExportOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportOptions {
    #[serde(default)]
    export_pattern: Option<String>,
}

impl From<FileRecord> for RemoteFile {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            directory_id: record.directory_id,
            branch_id: record.branch_id,
            export_pattern: record.export_options.and_then(|options| options.export_pattern),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BuildRecord {
    id: u64,
    status: String,
}

impl From<BuildRecord> for BuildHandle {
    fn from(record: BuildRecord) -> Self {
        Self {
            id: record.id,
            status: BuildStatus::from_remote(&record.status),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DownloadRecord {
    url: String,
}

#[derive(Debug, Deserialize)]
struct StorageRecord {
    id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRecord {
    #[serde(default)]
    target_languages: Vec<Language>,
    /// An object keyed by language id, or an empty list when unset
    #[serde(default)]
    language_mapping: Option<serde_json::Value>,
}

/// [`RemotePlatform`] over HTTPS, bound to a single project.
#[derive(Debug, Clone)]
pub struct HttpPlatformClient {
    client: Client,
    api_base: String,
    project_id: u64,
    token: String,
    page_size: usize,
}

impl HttpPlatformClient {
    pub fn new(
        base_url: &str,
        project_id: u64,
        token: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_base: format!("{}/api/v2", base_url.trim_end_matches('/')),
            project_id,
            token: token.into(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn project_url(&self, path: &str) -> String {
        format!("{}/projects/{}{}", self.api_base, self.project_id, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        let envelope: Envelope<T> = self.execute(request).await?;
        Ok(envelope.data)
    }

    /// Sends an authorized request and decodes a successful JSON body.
    async fn execute<B: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<B, PlatformError> {
        let response = check_status(request.bearer_auth(&self.token).send().await?).await?;
        response
            .json::<B>()
            .await
            .map_err(|err| PlatformError::Decode(err.to_string()))
    }

    /// Follows offset pagination until a short page is returned.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let request = self
                .client
                .get(self.project_url(path))
                .query(query)
                .query(&[("limit", self.page_size), ("offset", offset)]);
            let page: ListEnvelope<T> = self.execute(request).await?;

            let count = page.data.len();
            items.extend(page.data.into_iter().map(|entry| entry.data));
            if count < self.page_size {
                return Ok(items);
            }
            offset += count;
        }
    }

    /// Uploads raw file content to storage, returning the storage id.
    async fn add_storage(&self, path: &Path) -> Result<u64, PlatformError> {
        let content = fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let storage: StorageRecord = self
            .send(
                self.client
                    .post(format!("{}/storages", self.api_base))
                    .header(FILE_NAME_HEADER, file_name)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(content),
            )
            .await?;
        Ok(storage.id)
    }

    fn branch_query(branch_id: Option<u64>) -> Vec<(&'static str, String)> {
        branch_id
            .map(|id| vec![("branchId", id.to_string())])
            .unwrap_or_default()
    }

    async fn project(&self) -> Result<ProjectRecord, PlatformError> {
        self.send(self.client.get(self.project_url(""))).await
    }
}

async fn check_status(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::Status {
        status: status.as_u16(),
        body,
    })
}

fn mapping_from(value: Option<serde_json::Value>) -> Result<LanguageMapping, PlatformError> {
    match value {
        Some(value @ serde_json::Value::Object(_)) => {
            serde_json::from_value(value).map_err(|err| PlatformError::Decode(err.to_string()))
        }
        _ => Ok(LanguageMapping::new()),
    }
}

impl RemotePlatform for HttpPlatformClient {
    async fn start_build(&self, branch_id: Option<u64>) -> Result<BuildHandle, PlatformError> {
        let body = match branch_id {
            Some(id) => serde_json::json!({ "branchId": id }),
            None => serde_json::json!({}),
        };
        let record: BuildRecord = self
            .send(
                self.client
                    .post(self.project_url("/translations/builds"))
                    .json(&body),
            )
            .await?;
        log::debug!("started translation build {}", record.id);
        Ok(record.into())
    }

    async fn poll_build(&self, build: &BuildHandle) -> Result<BuildHandle, PlatformError> {
        let record: BuildRecord = self
            .send(
                self.client
                    .get(self.project_url(&format!("/translations/builds/{}", build.id))),
            )
            .await?;
        Ok(record.into())
    }

    async fn download_url(&self, build: &BuildHandle) -> Result<Url, PlatformError> {
        let record: DownloadRecord = self
            .send(self.client.get(
                self.project_url(&format!("/translations/builds/{}/download", build.id)),
            ))
            .await?;
        Url::parse(&record.url).map_err(|err| PlatformError::Decode(err.to_string()))
    }

    async fn download_to(&self, url: &Url, destination: &Path) -> Result<(), PlatformError> {
        // Download links are pre-signed; no bearer token.
        let response = check_status(self.client.get(url.clone()).send().await?).await?;
        let bytes = response.bytes().await?;
        fs::write(destination, &bytes)?;
        Ok(())
    }

    async fn list_files(&self, branch_id: Option<u64>) -> Result<Vec<RemoteFile>, PlatformError> {
        let records: Vec<FileRecord> = self
            .list_all("/files", &Self::branch_query(branch_id))
            .await?;
        Ok(records.into_iter().map(RemoteFile::from).collect())
    }

    async fn list_directories(
        &self,
        branch_id: Option<u64>,
    ) -> Result<Vec<RemoteDirectory>, PlatformError> {
        self.list_all("/directories", &Self::branch_query(branch_id))
            .await
    }

    async fn list_languages(&self) -> Result<Vec<Language>, PlatformError> {
        Ok(self.project().await?.target_languages)
    }

    async fn language_mapping(&self) -> Result<LanguageMapping, PlatformError> {
        mapping_from(self.project().await?.language_mapping)
    }

    async fn languages_with_mapping(
        &self,
    ) -> Result<(Vec<Language>, LanguageMapping), PlatformError> {
        let project = self.project().await?;
        Ok((project.target_languages, mapping_from(project.language_mapping)?))
    }

    async fn resolve_branch(&self, name: &str) -> Result<Option<RemoteBranch>, PlatformError> {
        let branches: Vec<RemoteBranch> = self
            .list_all("/branches", &[("name", name.to_string())])
            .await?;
        Ok(branches.into_iter().find(|branch| branch.name == name))
    }

    async fn upload_translation(
        &self,
        path: &Path,
        file_id: u64,
        language_id: &str,
    ) -> Result<(), PlatformError> {
        let storage_id = self.add_storage(path).await?;
        let _: serde_json::Value = self
            .send(
                self.client
                    .post(self.project_url(&format!("/translations/{language_id}")))
                    .json(&serde_json::json!({
                        "storageId": storage_id,
                        "fileId": file_id,
                    })),
            )
            .await?;
        log::debug!(
            "uploaded {} as {language_id} translation of file {file_id}",
            path.display()
        );
        Ok(())
    }

    async fn upload_source(&self, source: NewSource<'_>) -> Result<RemoteFile, PlatformError> {
        let storage_id = self.add_storage(source.path).await?;
        let mut body = serde_json::json!({
            "storageId": storage_id,
            "name": source.name,
            "exportOptions": { "exportPattern": source.export_pattern },
        });
        if let Some(directory_id) = source.directory_id {
            body["directoryId"] = directory_id.into();
        } else if let Some(branch_id) = source.branch_id {
            body["branchId"] = branch_id.into();
        }
        let record: FileRecord = self
            .send(self.client.post(self.project_url("/files")).json(&body))
            .await?;
        log::debug!("added source {} as file {}", source.name, record.id);
        Ok(record.into())
    }

    async fn update_source(&self, path: &Path, file_id: u64) -> Result<(), PlatformError> {
        let storage_id = self.add_storage(path).await?;
        let _: FileRecord = self
            .send(
                self.client
                    .put(self.project_url(&format!("/files/{file_id}")))
                    .json(&serde_json::json!({ "storageId": storage_id })),
            )
            .await?;
        log::debug!("updated source file {file_id} from {}", path.display());
        Ok(())
    }

    async fn create_directory(
        &self,
        name: &str,
        parent_id: Option<u64>,
        branch_id: Option<u64>,
    ) -> Result<RemoteDirectory, PlatformError> {
        let mut body = serde_json::json!({ "name": name });
        if let Some(parent_id) = parent_id {
            body["directoryId"] = parent_id.into();
        } else if let Some(branch_id) = branch_id {
            body["branchId"] = branch_id.into();
        }
        self.send(self.client.post(self.project_url("/directories")).json(&body))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> HttpPlatformClient {
        HttpPlatformClient::new(&server.uri(), 7, "token").unwrap()
    }

    #[tokio::test]
    async fn starts_and_polls_builds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/projects/7/translations/builds"))
            .and(header("authorization", "Bearer token"))
            .and(body_json(json!({ "branchId": 3 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": 11, "status": "inProgress", "progress": 0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/translations/builds/11"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": 11, "status": "finished", "progress": 100 }
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let build = client.start_build(Some(3)).await.unwrap();
        assert_eq!(build.status, BuildStatus::Pending);
        let build = client.poll_build(&build).await.unwrap();
        assert_eq!(build, BuildHandle { id: 11, status: BuildStatus::Finished });
    }

    #[tokio::test]
    async fn downloads_archive_from_signed_url() {
        let server = MockServer::start().await;
        let signed = format!("{}/signed/archive.zip", server.uri());
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/translations/builds/5/download"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "data": { "url": signed } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/signed/archive.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-bytes".to_vec()))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let build = BuildHandle { id: 5, status: BuildStatus::Finished };
        let url = client.download_url(&build).await.unwrap();
        let dir = tempdir().unwrap();
        let target = dir.path().join("archive.zip");
        client.download_to(&url, &target).await.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"PK-bytes");
    }

    #[tokio::test]
    async fn paginates_file_listing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/files"))
            .and(query_param("offset", "0"))
            .and(query_param("branchId", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "data": {
                        "id": 1, "name": "a.json", "directoryId": 4, "branchId": 3,
                        "exportOptions": { "exportPattern": "/%locale%/%original_file_name%" }
                    } },
                    { "data": { "id": 2, "name": "b.json", "directoryId": null, "branchId": 3 } }
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/files"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "data": { "id": 3, "name": "c.json", "directoryId": 4, "branchId": 3 } }
                ]
            })))
            .mount(&server)
            .await;

        let client = client(&server).await.with_page_size(2);
        let files = client.list_files(Some(3)).await.unwrap();
        assert_eq!(files.len(), 3);
        assert_eq!(
            files[0].export_pattern.as_deref(),
            Some("/%locale%/%original_file_name%")
        );
        assert_eq!(files[1].directory_id, None);
        assert_eq!(files[2].name, "c.json");
    }

    #[tokio::test]
    async fn reads_languages_and_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "id": 7,
                    "targetLanguages": [
                        { "id": "uk", "name": "Ukrainian", "twoLettersCode": "uk",
                          "threeLettersCode": "ukr", "locale": "uk-UA",
                          "androidCode": "uk-rUA", "osxCode": "uk.lproj", "osxLocale": "uk" }
                    ],
                    "languageMapping": { "uk": { "two_letters_code": "ua" } }
                }
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let languages = client.list_languages().await.unwrap();
        assert_eq!(languages[0].locale, "uk-UA");
        let mapping = client.language_mapping().await.unwrap();
        assert_eq!(mapping.get("uk", "two_letters_code"), Some("ua"));
    }

    #[tokio::test]
    async fn empty_list_mapping_is_no_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "targetLanguages": [], "languageMapping": [] }
            })))
            .mount(&server)
            .await;

        let mapping = client(&server).await.language_mapping().await.unwrap();
        assert!(mapping.is_empty());
    }

    #[tokio::test]
    async fn resolves_branch_by_exact_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/branches"))
            .and(query_param("name", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [ { "data": { "id": 9, "name": "main" } } ]
            })))
            .mount(&server)
            .await;

        let client = client(&server).await;
        let branch = client.resolve_branch("main").await.unwrap();
        assert_eq!(branch, Some(RemoteBranch { id: 9, name: "main".into() }));
    }

    #[tokio::test]
    async fn surfaces_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7/directories"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client(&server).await.list_directories(None).await.unwrap_err();
        assert!(matches!(err, PlatformError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn uploads_translation_through_storage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/storages"))
            .and(header("Crowdin-API-FileName", "fr.json"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": 77 } })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/projects/7/translations/fr"))
            .and(body_json(json!({ "storageId": 77, "fileId": 12 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "projectId": 7, "storageId": 77, "languageId": "fr", "fileId": 12 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("fr.json");
        fs::write(&file, "{}").unwrap();
        client(&server)
            .await
            .upload_translation(&file, 12, "fr")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reads_languages_and_mapping_in_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/projects/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    "targetLanguages": [
                        { "id": "de", "name": "German", "twoLettersCode": "de", "locale": "de-DE" }
                    ],
                    "languageMapping": { "de": { "locale": "de" } }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (languages, mapping) = client(&server).await.languages_with_mapping().await.unwrap();
        assert_eq!(languages[0].id, "de");
        assert_eq!(mapping.get("de", "locale"), Some("de"));
    }

    #[tokio::test]
    async fn adds_source_into_directory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/storages"))
            .and(header("Crowdin-API-FileName", "strings.json"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": 31 } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v2/projects/7/files"))
            .and(body_json(json!({
                "storageId": 31,
                "name": "strings.json",
                "directoryId": 4,
                "exportOptions": { "exportPattern": "/src/l10n/%locale%/%original_file_name%" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": 90, "name": "strings.json", "directoryId": 4, "branchId": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("strings.json");
        fs::write(&file, "{}").unwrap();
        let created = client(&server)
            .await
            .upload_source(NewSource {
                path: &file,
                name: "strings.json",
                directory_id: Some(4),
                branch_id: Some(2),
                export_pattern: "/src/l10n/%locale%/%original_file_name%",
            })
            .await
            .unwrap();
        assert_eq!(created.id, 90);
        assert_eq!(created.branch_id, Some(2));
    }

    #[tokio::test]
    async fn updates_existing_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/storages"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": 32 } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/v2/projects/7/files/12"))
            .and(body_json(json!({ "storageId": 32 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "id": 12, "name": "a.json" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let file = dir.path().join("a.json");
        fs::write(&file, "{}").unwrap();
        client(&server).await.update_source(&file, 12).await.unwrap();
    }

    #[tokio::test]
    async fn creates_directory_at_branch_root() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/projects/7/directories"))
            .and(body_json(json!({ "name": "src", "branchId": 2 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": { "id": 40, "name": "src", "directoryId": null, "branchId": 2 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = client(&server)
            .await
            .create_directory("src", None, Some(2))
            .await
            .unwrap();
        assert_eq!(created.id, 40);
        assert_eq!(created.directory_id, None);
    }
}
