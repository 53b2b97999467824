//! In-process registry used by the integration tests.
//!
//! Serves the subset of the distribution API the client speaks, keeps
//! everything in memory, and logs every request it handles. [`Faults`]
//! switch on misbehaviour for negative tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use motel_registry::{BlobStream, Digest};

/// Misbehaviour switches.
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Status returned by `GET /v2/` instead of 200.
    pub liveness_status: Option<u16>,
    /// Report a digest on finalize that does not match the stored content.
    pub wrong_finalize_digest: bool,
    /// Leave out the `Digest` and `Length` headers on finalize.
    pub omit_finalize_headers: bool,
    /// Report the finalize digest as bare hex.
    pub bare_digest_header: bool,
    /// Status returned by every blob `HEAD` instead of the real answer.
    pub head_status: Option<u16>,
    /// Return the session location only in the `Location` header.
    pub location_in_header_only: bool,
    /// Status returned by upload session start instead of 201.
    pub start_status: Option<u16>,
    /// Status returned by the streaming `PATCH` instead of 204.
    pub patch_status: Option<u16>,
    /// Status returned by finalize instead of 204.
    pub finalize_status: Option<u16>,
    /// Status returned by manifest `PUT` instead of 201; nothing is stored.
    pub manifest_put_status: Option<u16>,
}

/// A request the registry handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedRequest {
    pub method: Method,
    pub path: String,
}

#[derive(Debug, Default)]
struct Inner {
    faults: Faults,
    manifests: HashMap<String, Vec<u8>>,
    blobs: HashMap<String, Vec<u8>>,
    sessions: HashMap<String, Vec<u8>>,
    next_session: u64,
    requests: Vec<LoggedRequest>,
}

type Shared = Arc<Mutex<Inner>>;

/// Handle to a running fake registry.
pub struct FakeRegistry {
    addr: SocketAddr,
    state: Shared,
}

impl FakeRegistry {
    /// Starts a well-behaved registry.
    pub async fn start() -> Self {
        Self::start_with(Faults::default()).await
    }

    /// Starts a registry with the given faults enabled.
    pub async fn start_with(faults: Faults) -> Self {
        let state: Shared = Arc::new(Mutex::new(Inner {
            faults,
            ..Inner::default()
        }));
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Location string for `path` (`name:tag`) on this registry.
    pub fn reference(&self, path: &str) -> String {
        format!("//127.0.0.1:{}/{path}", self.addr.port())
    }

    /// Replaces the active faults.
    pub fn set_faults(&self, faults: Faults) {
        self.state.lock().faults = faults;
    }

    /// Stores a blob directly, bypassing the upload protocol.
    pub fn insert_blob(&self, content: &[u8]) -> Digest {
        let digest = Digest::sha256(content);
        self.state
            .lock()
            .blobs
            .insert(digest.to_string(), content.to_vec());
        digest
    }

    /// Returns a stored blob.
    pub fn blob(&self, digest: &Digest) -> Option<Vec<u8>> {
        self.state.lock().blobs.get(&digest.to_string()).cloned()
    }

    /// Returns the number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.state.lock().blobs.len()
    }

    /// Returns a stored manifest.
    pub fn manifest(&self, name: &str, tag: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .manifests
            .get(&format!("{name}:{tag}"))
            .cloned()
    }

    /// Returns every request handled so far.
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.state.lock().requests.clone()
    }

    /// Counts handled requests with `method` whose path contains `fragment`.
    pub fn count(&self, method: &Method, fragment: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| &r.method == method && r.path.contains(fragment))
            .count()
    }

    /// Forgets the request log.
    pub fn clear_requests(&self) {
        self.state.lock().requests.clear();
    }
}

/// A blob source that yields `prefix` and then fails.
pub fn failing_stream(prefix: &'static [u8]) -> BlobStream {
    let items: Vec<io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(prefix)),
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "source truncated")),
    ];
    Box::pin(futures::stream::iter(items))
}

/// A blob source yielding `parts` as separate chunks.
pub fn chunked_stream(parts: Vec<Vec<u8>>) -> BlobStream {
    let items: Vec<io::Result<Bytes>> = parts.into_iter().map(|p| Ok(Bytes::from(p))).collect();
    Box::pin(futures::stream::iter(items))
}

/// A blob source yielding `parts` with `delay` before each chunk.
pub fn slow_stream(parts: Vec<Vec<u8>>, delay: Duration) -> BlobStream {
    let stream = futures::stream::unfold(parts.into_iter(), move |mut parts| async move {
        let part = parts.next()?;
        tokio::time::sleep(delay).await;
        Some((Ok(Bytes::from(part)), parts))
    });
    Box::pin(stream)
}

async fn handle(State(state): State<Shared>, method: Method, uri: Uri, body: Bytes) -> Response {
    route(&state, &method, &uri, &body)
}

fn route(state: &Shared, method: &Method, uri: &Uri, body: &[u8]) -> Response {
    let path = uri.path().to_string();
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut inner = state.lock();
    inner.requests.push(LoggedRequest {
        method: method.clone(),
        path: path.clone(),
    });

    if path == "/v2/" {
        return status(inner.faults.liveness_status.unwrap_or(200));
    }
    let Some(rest) = path.strip_prefix("/v2/") else {
        return status(404);
    };

    if let Some((name, tag)) = rest.rsplit_once("/manifests/") {
        return manifests(&mut inner, method, &format!("{name}:{tag}"), body);
    }
    if let Some((name, session)) = rest.split_once("/blobs/uploads/") {
        return uploads(&mut inner, method, name, session, &query, body);
    }
    if let Some((_, digest)) = rest.rsplit_once("/blobs/") {
        return blobs(&inner, method, digest);
    }
    status(404)
}

fn manifests(inner: &mut Inner, method: &Method, key: &str, body: &[u8]) -> Response {
    match *method {
        Method::GET => match inner.manifests.get(key) {
            Some(raw) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/vnd.oci.image.manifest.v1+json")],
                raw.clone(),
            )
                .into_response(),
            None => status(404),
        },
        Method::PUT => {
            if let Some(code) = inner.faults.manifest_put_status {
                return status(code);
            }
            inner.manifests.insert(key.to_string(), body.to_vec());
            status(201)
        }
        Method::DELETE => match inner.manifests.remove(key) {
            Some(_) => status(202),
            None => status(404),
        },
        _ => status(405),
    }
}

fn uploads(
    inner: &mut Inner,
    method: &Method,
    name: &str,
    session: &str,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    match (method, session) {
        (&Method::POST, "") => match query.get("digest") {
            Some(claimed) => single_shot(inner, claimed, body),
            None => start_session(inner, name),
        },
        (&Method::PATCH, _) | (&Method::PUT, _) => {
            let fault = if *method == Method::PATCH {
                inner.faults.patch_status
            } else {
                inner.faults.finalize_status
            };
            if let Some(code) = fault {
                return status(code);
            }
            session_step(inner, method, session, body)
        }
        _ => status(405),
    }
}

fn session_step(inner: &mut Inner, method: &Method, id: &str, body: &[u8]) -> Response {
    match *method {
        Method::PATCH => match inner.sessions.get_mut(id) {
            Some(data) => {
                data.extend_from_slice(body);
                status(204)
            }
            None => status(404),
        },
        Method::PUT => match inner.sessions.remove(id) {
            Some(data) => finalize(inner, data),
            None => status(404),
        },
        _ => status(405),
    }
}

fn start_session(inner: &mut Inner, name: &str) -> Response {
    if let Some(code) = inner.faults.start_status {
        return status(code);
    }
    inner.next_session += 1;
    let id = inner.next_session.to_string();
    inner.sessions.insert(id.clone(), Vec::new());
    let location = format!("/v2/{name}/blobs/uploads/{id}");

    if inner.faults.location_in_header_only {
        (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
    } else {
        let body = serde_json::json!({ "Location": location }).to_string();
        (StatusCode::CREATED, body).into_response()
    }
}

fn single_shot(inner: &mut Inner, claimed: &str, body: &[u8]) -> Response {
    let actual = Digest::sha256(body);
    if actual.to_string() != claimed {
        return (StatusCode::BAD_REQUEST, r#"{"errors":[{"code":"DIGEST_INVALID","message":"digest did not match content"}]}"#).into_response();
    }
    inner.blobs.insert(actual.to_string(), body.to_vec());
    status(201)
}

fn finalize(inner: &mut Inner, data: Vec<u8>) -> Response {
    let actual = Digest::sha256(&data);
    let length = data.len();
    inner.blobs.insert(actual.to_string(), data);

    if inner.faults.omit_finalize_headers {
        return status(204);
    }

    let reported = if inner.faults.wrong_finalize_digest {
        Digest::sha256(b"something else entirely")
    } else {
        actual
    };
    let reported = if inner.faults.bare_digest_header {
        reported.encoded().to_string()
    } else {
        reported.to_string()
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("digest"),
        HeaderValue::from_str(&reported).unwrap(),
    );
    headers.insert(HeaderName::from_static("length"), HeaderValue::from(length));
    (StatusCode::NO_CONTENT, headers).into_response()
}

fn blobs(inner: &Inner, method: &Method, digest: &str) -> Response {
    match *method {
        Method::HEAD => {
            if let Some(code) = inner.faults.head_status {
                return status(code);
            }
            if inner.blobs.contains_key(digest) {
                status(200)
            } else {
                status(404)
            }
        }
        Method::GET => match inner.blobs.get(digest) {
            Some(data) => (StatusCode::OK, data.clone()).into_response(),
            None => status(404),
        },
        _ => status(405),
    }
}

fn status(code: u16) -> Response {
    StatusCode::from_u16(code).unwrap().into_response()
}
