//! Joplin Web Clipper REST API client

use super::types::{Note, NoteStore, StoreError};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Body the ping endpoint answers with
const PING_RESPONSE: &str = "JoplinClipperServer";

/// Fields requested whenever a full note is needed
const NOTE_FIELDS: &str = "id,title,body,parent_id,updated_time";

/// Fields requested from the search endpoint
const SEARCH_FIELDS: &str = "id,title,parent_id";

const PAGE_LIMIT: u32 = 100;

/// Client for the local Joplin REST API
#[derive(Debug, Clone)]
pub struct JoplinClient {
    /// e.g. `http://localhost:41184`
    base_url: String,

    /// API token
    token: String,

    client: reqwest::Client,
}

/// One page of a paginated listing
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    parent_id: String,
}

#[derive(Debug, Serialize)]
struct UpdateNoteRequest<'a> {
    body: &'a str,
}

impl JoplinClient {
    /// Create a client from the connection section of the config
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, StoreError> {
        Self::new(
            format!("http://{}:{}", config.host, config.port),
            config.token.clone().unwrap_or_default(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Create a client with explicit parameters
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET a JSON document, authenticating with the token query parameter
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .query(&[("token", self.token.as_str())])
            .query(params)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::parse(format!("failed to decode {}: {}", path, e)))
    }
}

/// Map HTTP status to StoreError
fn map_http_error(status: reqwest::StatusCode, body: &str) -> StoreError {
    let message = format!("HTTP {}: {}", status, body.trim());
    match status.as_u16() {
        401 | 403 => StoreError::auth("check your API token"),
        404 => StoreError::NotFound { message },
        code @ 400..=499 => StoreError::BadRequest {
            status: code,
            message,
        },
        code @ 500..=599 => StoreError::server(code, message),
        _ => StoreError::unexpected(message),
    }
}

/// Map a transport-level reqwest failure to StoreError
fn map_request_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() {
        StoreError::network(format!(
            "cannot connect to Joplin, is the desktop app running with the Web Clipper enabled? ({})",
            e
        ))
    } else if e.is_timeout() {
        StoreError::network(format!("request timed out: {}", e))
    } else {
        StoreError::network(format!("request failed: {}", e))
    }
}

#[async_trait]
impl NoteStore for JoplinClient {
    async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(self.url("/ping"))
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        if body.trim() != PING_RESPONSE {
            return Err(StoreError::unexpected(format!(
                "ping endpoint answered {:?}",
                body
            )));
        }

        Ok(())
    }

    async fn fetch_all_notes(&self, notebook: Option<&str>) -> Result<Vec<Note>, StoreError> {
        let mut notes = Vec::new();
        let mut page = 1;

        loop {
            let params = [
                ("fields", NOTE_FIELDS.to_string()),
                ("page", page.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            let response: Page<Note> = self.get_json("/notes", &params).await?;

            notes.extend(
                response
                    .items
                    .into_iter()
                    .filter(|note| note.in_notebook(notebook)),
            );

            if !response.has_more {
                break;
            }
            page += 1;
        }

        tracing::debug!(count = notes.len(), pages = page, "fetched all notes");
        Ok(notes)
    }

    async fn search_notes(
        &self,
        query: &str,
        notebook: Option<&str>,
    ) -> Result<Vec<String>, StoreError> {
        let mut hits = Vec::new();
        let mut page = 1;

        loop {
            let params = [
                ("query", query.to_string()),
                ("type", "note".to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
                ("page", page.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            let response: Page<SearchHit> = self.get_json("/search", &params).await?;

            hits.extend(
                response
                    .items
                    .into_iter()
                    .filter(|hit| notebook.is_none_or(|id| hit.parent_id == id))
                    .map(|hit| hit.id),
            );

            if !response.has_more {
                break;
            }
            page += 1;
        }

        tracing::debug!(query, hits = hits.len(), "search complete");
        Ok(hits)
    }

    async fn fetch_note(&self, id: &str) -> Result<Note, StoreError> {
        self.get_json(
            &format!("/notes/{}", id),
            &[("fields", NOTE_FIELDS.to_string())],
        )
        .await
    }

    async fn update_note(&self, id: &str, body: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.url(&format!("/notes/{}", id)))
            .query(&[("token", self.token.as_str())])
            .json(&UpdateNoteRequest { body })
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        tracing::debug!(note_id = id, "note updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// A request as seen by the fake server
    #[derive(Debug, Clone)]
    struct Seen {
        method: String,
        target: String,
        body: String,
    }

    /// Serve canned responses from `route` on a random local port, one request per connection
    async fn fake_joplin<F>(route: F) -> (String, Arc<Mutex<Vec<Seen>>>)
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let route = Arc::new(route);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let log = log.clone();
                let route = route.clone();
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let header_end = loop {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            return;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };

                    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                    let content_length = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    while buf.len() < header_end + content_length {
                        let n = socket.read(&mut chunk).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        buf.extend_from_slice(&chunk[..n]);
                    }

                    let mut request_line = head.lines().next().unwrap_or("").split(' ');
                    let method = request_line.next().unwrap_or("").to_string();
                    let target = request_line.next().unwrap_or("").to_string();
                    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

                    let (status, payload) = route(&method, &target);
                    log.lock().unwrap().push(Seen {
                        method,
                        target,
                        body,
                    });

                    let response = format!(
                        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{}",
                        status,
                        payload.len(),
                        payload
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{}", addr), seen)
    }

    fn client(base_url: &str) -> JoplinClient {
        JoplinClient::new(base_url, "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_url_building() {
        let c = JoplinClient::new("http://localhost:41184/", "t", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url("/notes/abc"), "http://localhost:41184/notes/abc");
    }

    #[test]
    fn test_from_config() {
        let config = ConnectionConfig {
            host: "127.0.0.1".into(),
            port: 12345,
            token: Some("tok".into()),
            timeout_secs: 10,
        };
        let c = JoplinClient::from_config(&config).unwrap();
        assert_eq!(c.base_url, "http://127.0.0.1:12345");
        assert_eq!(c.token, "tok");
    }

    #[test]
    fn test_map_http_error() {
        let err = map_http_error(reqwest::StatusCode::UNAUTHORIZED, "bad token");
        assert!(matches!(err, StoreError::Auth { .. }));

        let err = map_http_error(reqwest::StatusCode::FORBIDDEN, "");
        assert!(matches!(err, StoreError::Auth { .. }));

        let err = map_http_error(reqwest::StatusCode::NOT_FOUND, "");
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = map_http_error(reqwest::StatusCode::BAD_REQUEST, "nope");
        assert!(matches!(err, StoreError::BadRequest { status: 400, .. }));

        let err = map_http_error(reqwest::StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(matches!(err, StoreError::Server { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_ping_ok() {
        let (url, seen) = fake_joplin(|_, _| (200, PING_RESPONSE.to_string())).await;

        client(&url).ping().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "GET");
        assert!(seen[0].target.starts_with("/ping?token=secret"));
    }

    #[tokio::test]
    async fn test_ping_rejected_token() {
        let (url, _) = fake_joplin(|_, _| (403, "{\"error\":\"Invalid token\"}".into())).await;

        let err = client(&url).ping().await.unwrap_err();
        assert!(matches!(err, StoreError::Auth { .. }));
    }

    #[tokio::test]
    async fn test_ping_wrong_service() {
        let (url, _) = fake_joplin(|_, _| (200, "hello".into())).await;

        let err = client(&url).ping().await.unwrap_err();
        assert!(matches!(err, StoreError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_ping_unreachable() {
        // Bind and drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{}", addr)).ping().await.unwrap_err();
        assert!(matches!(err, StoreError::Network { .. }));
    }

    #[tokio::test]
    async fn test_fetch_all_notes_paginates_and_filters() {
        let (url, seen) = fake_joplin(|_, target| {
            if target.contains("page=1") {
                (
                    200,
                    r#"{"items":[{"id":"a","title":"A","body":"x","parent_id":"nb1"},
                                 {"id":"b","title":"B","body":"y","parent_id":"nb2"}],
                        "has_more":true}"#
                        .into(),
                )
            } else {
                (
                    200,
                    r#"{"items":[{"id":"c","title":"C","body":"z","parent_id":"nb1"}],"has_more":false}"#
                        .into(),
                )
            }
        })
        .await;

        let c = client(&url);
        let all = c.fetch_all_notes(None).await.unwrap();
        assert_eq!(
            all.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );

        let filtered = c.fetch_all_notes(Some("nb1")).await.unwrap();
        assert_eq!(
            filtered.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            ["a", "c"]
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|s| s.target.starts_with("/notes?")));
        assert!(seen[0].target.contains("token=secret"));
    }

    #[tokio::test]
    async fn test_fetch_matching_notes_skips_unfetchable() {
        let (url, _) = fake_joplin(|_, target| {
            if target.starts_with("/search") {
                (
                    200,
                    r#"{"items":[{"id":"a","title":"A","parent_id":"nb1"},
                                 {"id":"gone","title":"G","parent_id":"nb1"}],
                        "has_more":false}"#
                        .into(),
                )
            } else if target.starts_with("/notes/a") {
                (
                    200,
                    r#"{"id":"a","title":"A","body":"hello","parent_id":"nb1","updated_time":1}"#
                        .into(),
                )
            } else {
                (404, "{}".into())
            }
        })
        .await;

        let notes = client(&url)
            .fetch_matching_notes("hello", None)
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "hello");
    }

    #[tokio::test]
    async fn test_transient_note_fetch_is_retried() {
        use crate::cli::CancellationToken;
        use crate::store::{RetryPolicy, RetryStore};
        use std::sync::atomic::{AtomicU32, Ordering};

        let note_gets = Arc::new(AtomicU32::new(0));
        let counter = note_gets.clone();
        let (url, _) = fake_joplin(move |_, target| {
            if target.starts_with("/search") {
                (
                    200,
                    r#"{"items":[{"id":"a","title":"A","parent_id":"nb1"}],"has_more":false}"#.into(),
                )
            } else if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                (503, "busy".into())
            } else {
                (
                    200,
                    r#"{"id":"a","title":"A","body":"hello","parent_id":"nb1","updated_time":1}"#
                        .into(),
                )
            }
        })
        .await;

        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let store = RetryStore::new(client(&url), policy, CancellationToken::new());

        let notes = store.fetch_matching_notes("hello", None).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "a");
        assert_eq!(note_gets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_update_note_sends_only_body() {
        let (url, seen) = fake_joplin(|_, _| (200, "{}".into())).await;

        client(&url).update_note("abc", "new\nbody").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "PUT");
        assert!(seen[0].target.starts_with("/notes/abc?token=secret"));
        let sent: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(sent, serde_json::json!({"body": "new\nbody"}));
    }

    #[tokio::test]
    async fn test_update_note_server_error() {
        let (url, _) = fake_joplin(|_, _| (500, "boom".into())).await;

        let err = client(&url).update_note("abc", "x").await.unwrap_err();
        assert!(matches!(err, StoreError::Server { status: 500, .. }));
    }
}
