//! Google Drive `appDataFolder` object store
//!
//! Drive has no paths, so each object is a file in `appDataFolder` whose
//! name is the full object key (`records/c1.json`). Key to file-id lookups
//! are cached; a stale id (404) is dropped and looked up again.

use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{ObjectInfo, ObjectStore};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::DateTime;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::GoogleDriveError;
use crate::token::AccessTokenProvider;
use crate::types::{
    ApiErrorEnvelope, CreateFileMetadata, DriveFile, FilesListResponse, APP_DATA_FOLDER,
};

/// Google Drive API base URL
const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Upload endpoint base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,size,modifiedTime";

const MULTIPART_BOUNDARY: &str = "cloudsync-part-boundary";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Object store over the Drive v3 `appDataFolder`
///
/// Transport failures and non-2xx statuses are returned as errors without
/// retrying; the sync engine treats them as a failed item or operation and
/// tries again next cycle.
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::{GoogleDriveObjectStore, StaticTokenProvider};
///
/// let tokens = Arc::new(StaticTokenProvider::new(access_token));
/// let remote = GoogleDriveObjectStore::new(http_client, tokens);
/// let manifest = remote.get("metadata.json").await?;
/// ```
pub struct GoogleDriveObjectStore {
    http_client: Arc<dyn HttpClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    file_ids: Mutex<HashMap<String, String>>,
}

impl GoogleDriveObjectStore {
    pub fn new(http_client: Arc<dyn HttpClient>, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http_client,
            tokens,
            file_ids: Mutex::new(HashMap::new()),
        }
    }

    fn ids(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.file_ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget(&self, key: &str) {
        self.ids().remove(key);
    }

    /// Parse RFC 3339 timestamp to Unix millis
    fn parse_timestamp(rfc3339: &str) -> Option<i64> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.timestamp_millis())
    }

    fn to_object_info(file: DriveFile) -> ObjectInfo {
        ObjectInfo {
            size: file.size.and_then(|s| s.parse().ok()).unwrap_or(0),
            last_modified: file.modified_time.as_deref().and_then(Self::parse_timestamp),
            key: file.name,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.tokens.access_token().await?;
        self.http_client
            .execute(request.bearer_token(token).timeout(REQUEST_TIMEOUT))
            .await
    }

    /// Resolve `key` to a Drive file id, querying by name on a cache miss
    async fn file_id(&self, key: &str) -> Result<Option<String>> {
        if let Some(id) = self.ids().get(key) {
            return Ok(Some(id.clone()));
        }

        let query = format!(
            "name = '{}' and trashed = false",
            escape_query_value(key)
        );
        let url = format!(
            "{}/files?spaces={}&q={}&pageSize=1&fields=files({})",
            DRIVE_API_BASE,
            APP_DATA_FOLDER,
            urlencoding::encode(&query),
            FILE_FIELDS
        );
        let response = check(self.send(HttpRequest::new(HttpMethod::Get, url)).await?)?;
        let listing: FilesListResponse = parse(&response, "files list")?;

        let id = listing.files.into_iter().next().map(|file| file.id);
        if let Some(id) = &id {
            self.ids().insert(key.to_string(), id.clone());
        }
        Ok(id)
    }

    async fn create(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let metadata = CreateFileMetadata {
            name: key,
            parents: [APP_DATA_FOLDER],
        };
        let url = format!(
            "{}/files?uploadType=multipart&fields={}",
            DRIVE_UPLOAD_BASE, FILE_FIELDS
        );
        let request = HttpRequest::new(HttpMethod::Post, url).body(
            multipart_body(&metadata, &body, content_type)?,
            format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
        );

        let response = check(self.send(request).await?)?;
        let created: DriveFile = parse(&response, "created file")?;
        debug!(key = key, file_id = %created.id, "Created Drive file");
        self.ids().insert(key.to_string(), created.id);
        Ok(())
    }

    /// Replace the content of an existing file; `false` when the id is stale
    async fn update(&self, file_id: &str, body: Bytes, content_type: &str) -> Result<bool> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields={}",
            DRIVE_UPLOAD_BASE, file_id, FILE_FIELDS
        );
        let response = self
            .send(HttpRequest::new(HttpMethod::Patch, url).body(body, content_type))
            .await?;
        if response.status == 404 {
            return Ok(false);
        }
        check(response)?;
        Ok(true)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl ObjectStore for GoogleDriveObjectStore {
    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        if let Some(file_id) = self.file_id(key).await? {
            if self.update(&file_id, body.clone(), content_type).await? {
                debug!(key = key, "Updated Drive file");
                return Ok(());
            }
            warn!(key = key, file_id = %file_id, "Cached Drive file id is stale");
            self.forget(key);
        }
        self.create(key, body, content_type).await
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let Some(file_id) = self.file_id(key).await? else {
            return Ok(None);
        };

        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, file_id);
        let response = self.send(HttpRequest::new(HttpMethod::Get, url)).await?;
        if response.status == 404 {
            self.forget(key);
            return Ok(None);
        }
        let response = check(response)?;
        debug!(key = key, size = response.body.len(), "Downloaded Drive file");
        Ok(Some(response.body))
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!(
                "{}/files?spaces={}&q={}&pageSize={}&fields=nextPageToken,files({})",
                DRIVE_API_BASE,
                APP_DATA_FOLDER,
                urlencoding::encode("trashed = false"),
                MAX_PAGE_SIZE,
                FILE_FIELDS
            );
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = check(self.send(HttpRequest::new(HttpMethod::Get, url)).await?)?;
            let page: FilesListResponse = parse(&response, "files list")?;

            {
                let mut ids = self.ids();
                for file in page.files {
                    if !file.name.starts_with(prefix) {
                        continue;
                    }
                    ids.insert(file.name.clone(), file.id.clone());
                    objects.push(Self::to_object_info(file));
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        info!(prefix = prefix, count = objects.len(), "Listed Drive objects");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let Some(file_id) = self.file_id(key).await? else {
            return Ok(());
        };

        let url = format!("{}/files/{}", DRIVE_API_BASE, file_id);
        let response = self.send(HttpRequest::new(HttpMethod::Delete, url)).await?;
        self.forget(key);
        if response.status != 404 {
            check(response)?;
        }
        debug!(key = key, "Deleted Drive file");
        Ok(())
    }
}

/// Drive query strings quote with `'` and escape with `\`
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_body(
    metadata: &CreateFileMetadata<'_>,
    content: &[u8],
    content_type: &str,
) -> Result<Bytes> {
    let metadata = serde_json::to_vec(metadata)
        .map_err(|e| GoogleDriveError::ParseError(format!("Failed to encode metadata: {}", e)))?;

    let mut body = BytesMut::with_capacity(metadata.len() + content.len() + 256);
    body.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.put_slice(&metadata);
    body.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    body.put_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.put_slice(content);
    body.put_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    Ok(body.freeze())
}

fn header<'a>(response: &'a HttpResponse, name: &str) -> Option<&'a str> {
    response
        .headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Map non-2xx statuses to provider errors
fn check(response: HttpResponse) -> Result<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let status = response.status;
    let message = serde_json::from_slice::<ApiErrorEnvelope>(&response.body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).to_string());
    warn!(status = status, "Drive request failed: {}", message);

    let error = match status {
        401 | 403 => GoogleDriveError::AuthenticationFailed(message),
        429 => GoogleDriveError::RateLimitExceeded {
            retry_after_seconds: header(&response, "retry-after")
                .and_then(|value| value.trim().parse().ok())
                .unwrap_or(1),
        },
        _ => GoogleDriveError::ApiError {
            status_code: status,
            message,
        },
    };
    Err(error.into())
}

fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
    serde_json::from_slice(&response.body).map_err(|e| {
        GoogleDriveError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::StaticTokenProvider;
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        HttpClient {}

        #[async_trait::async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn respond(status: u16, body: &str) -> Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn store(mock_http: MockHttpClient) -> GoogleDriveObjectStore {
        GoogleDriveObjectStore::new(
            Arc::new(mock_http),
            Arc::new(StaticTokenProvider::new("test_token")),
        )
    }

    fn is_lookup(req: &HttpRequest) -> bool {
        req.method == HttpMethod::Get && req.url.contains("pageSize=1&")
    }

    #[test]
    fn test_escape_query_value() {
        assert_eq!(escape_query_value("it's"), "it\\'s");
        assert_eq!(escape_query_value("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_to_object_info() {
        let info = GoogleDriveObjectStore::to_object_info(DriveFile {
            id: "f1".to_string(),
            name: "records/c1.json".to_string(),
            size: Some("1024".to_string()),
            modified_time: Some("2024-01-01T00:00:00.000Z".to_string()),
        });

        assert_eq!(info.key, "records/c1.json");
        assert_eq!(info.size, 1024);
        assert_eq!(info.last_modified, Some(1_704_067_200_000));
    }

    #[test]
    fn test_multipart_body_layout() {
        let metadata = CreateFileMetadata {
            name: "metadata.json",
            parents: [APP_DATA_FOLDER],
        };
        let body = multipart_body(&metadata, b"{}", "application/json").unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.starts_with("--cloudsync-part-boundary\r\n"));
        assert!(text.contains(r#"{"name":"metadata.json","parents":["appDataFolder"]}"#));
        assert!(text.contains("Content-Type: application/json\r\n\r\n{}\r\n"));
        assert!(text.ends_with("--cloudsync-part-boundary--\r\n"));
    }

    #[tokio::test]
    async fn test_get_missing_key_returns_none() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|req| {
                assert!(is_lookup(&req));
                assert_eq!(
                    req.headers.get("Authorization"),
                    Some(&"Bearer test_token".to_string())
                );
                respond(200, r#"{"files": []}"#)
            });

        assert!(store(mock_http).get("metadata.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_downloads_and_caches_id() {
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&lookups);

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(move |req| {
            if is_lookup(&req) {
                counter.fetch_add(1, Ordering::SeqCst);
                return respond(200, r#"{"files": [{"id": "f1", "name": "metadata.json"}]}"#);
            }
            assert!(req.url.ends_with("/files/f1?alt=media"));
            respond(200, r#"{"version":1}"#)
        });

        let store = store(mock_http);
        let first = store.get("metadata.json").await.unwrap().unwrap();
        let second = store.get("metadata.json").await.unwrap().unwrap();

        assert_eq!(&first[..], br#"{"version":1}"#);
        assert_eq!(first, second);
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_put_creates_new_file() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            if is_lookup(&req) {
                return respond(200, r#"{"files": []}"#);
            }
            assert_eq!(req.method, HttpMethod::Post);
            assert!(req.url.contains("uploadType=multipart"));
            assert!(req.headers["Content-Type"].starts_with("multipart/related"));
            respond(200, r#"{"id": "new1", "name": "records/c1.json"}"#)
        });

        let store = store(mock_http);
        store
            .put("records/c1.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(store.ids().get("records/c1.json"), Some(&"new1".to_string()));
    }

    #[tokio::test]
    async fn test_put_updates_existing_file() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            if is_lookup(&req) {
                return respond(200, r#"{"files": [{"id": "f1", "name": "metadata.json"}]}"#);
            }
            assert_eq!(req.method, HttpMethod::Patch);
            assert!(req.url.contains("/files/f1?uploadType=media"));
            assert_eq!(req.body.as_deref(), Some(&b"{\"version\":2}"[..]));
            respond(200, r#"{"id": "f1", "name": "metadata.json"}"#)
        });

        store(mock_http)
            .put(
                "metadata.json",
                Bytes::from_static(b"{\"version\":2}"),
                "application/json",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_recreates_when_cached_id_is_stale() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| match req.method {
            HttpMethod::Patch => respond(404, r#"{"error": {"message": "File not found"}}"#),
            HttpMethod::Post => respond(200, r#"{"id": "f2", "name": "metadata.json"}"#),
            _ => panic!("unexpected request {}", req.url),
        });

        let store = store(mock_http);
        store
            .ids()
            .insert("metadata.json".to_string(), "gone".to_string());
        store
            .put("metadata.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(store.ids().get("metadata.json"), Some(&"f2".to_string()));
    }

    #[tokio::test]
    async fn test_list_filters_prefix_across_pages() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(2).returning(|req| {
            if req.url.contains("pageToken=page2") {
                return respond(
                    200,
                    r#"{"files": [{"id": "b1", "name": "backups/backup-1.json", "size": "10"}]}"#,
                );
            }
            respond(
                200,
                r#"{"files": [
                    {"id": "m1", "name": "metadata.json", "size": "5"},
                    {"id": "b2", "name": "backups/backup-2.json", "size": "20"}
                ], "nextPageToken": "page2"}"#,
            )
        });

        let store = store(mock_http);
        let listed = store.list("backups/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|info| info.key.as_str()).collect();

        assert_eq!(keys, vec!["backups/backup-1.json", "backups/backup-2.json"]);
        assert_eq!(listed[1].size, 20);
        assert!(store.ids().contains_key("backups/backup-1.json"));
        assert!(!store.ids().contains_key("metadata.json"));
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| respond(200, r#"{"files": []}"#));

        store(mock_http).delete("records/gone.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_tolerates_concurrent_removal() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Delete);
            respond(404, "")
        });

        let store = store(mock_http);
        store
            .ids()
            .insert("records/c1.json".to_string(), "f1".to_string());
        store.delete("records/c1.json").await.unwrap();
        assert!(store.ids().is_empty());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning({
            let calls = AtomicUsize::new(0);
            move |_| match calls.fetch_add(1, Ordering::SeqCst) {
                0 => respond(401, r#"{"error": {"code": 401, "message": "Invalid Credentials"}}"#),
                1 => Ok(HttpResponse {
                    status: 429,
                    headers: HashMap::from([("Retry-After".to_string(), "7".to_string())]),
                    body: Bytes::new(),
                }),
                _ => respond(500, "Backend Error"),
            }
        });

        let store = store(mock_http);
        let auth = store.get("metadata.json").await.unwrap_err().to_string();
        assert!(auth.contains("Authentication failed: Invalid Credentials"));

        let limited = store.get("metadata.json").await.unwrap_err().to_string();
        assert!(limited.contains("retry after 7 seconds"));

        let server = store.get("metadata.json").await.unwrap_err().to_string();
        assert!(server.contains("status 500"));
        assert!(server.contains("Backend Error"));
    }
}
