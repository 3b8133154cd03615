//! Shared fixtures for gateway tests: a vault in a temporary directory,
//! request signing and small XML helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::Router;
use chrono::Utc;
use http::{HeaderMap, HeaderValue, Method, Request, Response, Uri};
use tempfile::TempDir;
use tokio::time::Instant;
use tower::ServiceExt;

use gits3_daemon::http_server;
use gits3_daemon::http_server::s3::auth::{
    amz_date, authorization_header, sha256_hex, CONTENT_SHA256_HEADER, DATE_HEADER,
};
use gits3_daemon::service_config::Credentials;
use gits3_daemon::{ServiceConfig, ServiceState};

pub const BUCKET: &str = "vault";
pub const ACCESS_KEY: &str = "AKIDEXAMPLE";
pub const SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn credentials() -> Credentials {
    Credentials {
        access_key: ACCESS_KEY.to_string(),
        secret_key: SECRET_KEY.to_string(),
    }
}

/// A gateway wired up in-process, driven through [`tower::ServiceExt::oneshot`].
pub struct Gateway {
    pub state: ServiceState,
    router: Router,
    pub vault_dir: PathBuf,
    pub temp: TempDir,
}

impl Gateway {
    /// Start with a fresh local-only vault and no authentication.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        init_tracing();
        let temp = TempDir::new().expect("temp dir");
        let vault_dir = temp.path().join("vault");
        let mut config = ServiceConfig::new(&vault_dir);
        configure(&mut config);

        let state = ServiceState::from_config(&config)
            .await
            .expect("service state");
        let router = http_server::router(state.clone());
        Self {
            state,
            router,
            vault_dir,
            temp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Send `method path` with `body`, signed when authentication is on.
    pub async fn call(&self, method: Method, path: &str, body: impl Into<Vec<u8>>) -> Response<Body> {
        let request = match &self.state.config().credentials {
            Some(credentials) => signed_request(credentials, "localhost", method, path, body.into()),
            None => Request::builder()
                .method(method)
                .uri(path)
                .body(Body::from(body.into()))
                .expect("request"),
        };
        self.send(request).await
    }

    pub async fn put(&self, key: &str, body: impl Into<Vec<u8>>) -> Response<Body> {
        self.call(Method::PUT, &format!("/{BUCKET}/{key}"), body).await
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.call(Method::GET, path, "").await
    }

    pub async fn delete(&self, key: &str) -> Response<Body> {
        self.call(Method::DELETE, &format!("/{BUCKET}/{key}"), "")
            .await
    }

    pub fn file(&self, key: &str) -> PathBuf {
        self.vault_dir.join(key)
    }
}

/// Build a request carrying a SigV4 header for `credentials`, with the
/// payload hash of `body`.
pub fn signed_request(
    credentials: &Credentials,
    host: &str,
    method: Method,
    path: &str,
    body: Vec<u8>,
) -> Request<Body> {
    let uri: Uri = path.parse().expect("uri");
    let headers = signed_headers(credentials, host, &method, &uri, &body);

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body))
        .expect("request");
    request.headers_mut().extend(headers);
    request
}

pub fn signed_headers(
    credentials: &Credentials,
    host: &str,
    method: &Method,
    uri: &Uri,
    body: &[u8],
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("host", HeaderValue::from_str(host).expect("host"));
    headers.insert(
        DATE_HEADER,
        HeaderValue::from_str(&amz_date(&Utc::now())).expect("date"),
    );
    headers.insert(
        CONTENT_SHA256_HEADER,
        HeaderValue::from_str(&sha256_hex(body)).expect("hash"),
    );
    let authorization =
        authorization_header(credentials, "us-east-1", method, uri, &headers).expect("sign");
    headers.insert(
        "authorization",
        HeaderValue::from_str(&authorization).expect("authorization"),
    );
    headers
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

pub async fn body_string(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}

/// Undo the entity escaping of rendered XML documents.
pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#x2f;", "/")
        .replace("&#x2F;", "/")
        .replace("&amp;", "&")
}

/// Text of every `<tag>` element, unescaped, in document order.
pub fn elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut values = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(&close) else {
            break;
        };
        values.push(unescape(&after[..end]));
        rest = &after[end + close.len()..];
    }
    values
}

/// Text of the first `<tag>` element.
pub fn element(xml: &str, tag: &str) -> Option<String> {
    elements(xml, tag).into_iter().next()
}

/// A bare repository standing in for the remote.
pub fn bare_remote(dir: &Path) -> String {
    let repo = git2::Repository::init_bare(dir).expect("init bare remote");
    repo.set_head("refs/heads/main").expect("remote head");
    dir.to_string_lossy().into_owned()
}

/// Paths tracked in the remote's `main`, sorted.
pub fn remote_files(remote: &str) -> Vec<String> {
    let Ok(repo) = git2::Repository::open_bare(remote) else {
        return Vec::new();
    };
    let Ok(reference) = repo.find_reference("refs/heads/main") else {
        return Vec::new();
    };
    let tree = reference.peel_to_tree().expect("tree");
    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            files.push(format!("{root}{}", entry.name().unwrap_or_default()));
        }
        git2::TreeWalkResult::Ok
    })
    .expect("walk");
    files.sort();
    files
}

/// Content of `path` in the remote's `main`.
pub fn remote_file(remote: &str, path: &str) -> Option<Vec<u8>> {
    let repo = git2::Repository::open_bare(remote).ok()?;
    let tree = repo.find_reference("refs/heads/main").ok()?.peel_to_tree().ok()?;
    let entry = tree.get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).ok()?;
    Some(blob.content().to_vec())
}

/// Number of commits reachable from the remote's `main`.
pub fn remote_commit_count(remote: &str) -> usize {
    let Ok(repo) = git2::Repository::open_bare(remote) else {
        return 0;
    };
    let Ok(mut walk) = repo.revwalk() else {
        return 0;
    };
    if walk.push_ref("refs/heads/main").is_err() {
        return 0;
    }
    walk.count()
}

/// Poll `condition` every 20ms until it holds or `limit` elapses.
pub async fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Commit `files` onto the remote's `main` through a scratch clone, as
/// another writer would. Returns the new commit id.
pub fn commit_to_remote(remote: &str, scratch: &Path, files: &[(&str, &str)]) -> String {
    let repo = match git2::Repository::open(scratch) {
        Ok(repo) => repo,
        Err(_) => git2::Repository::clone(remote, scratch).expect("clone remote"),
    };
    repo.find_remote("origin")
        .expect("origin")
        .fetch(&["+refs/heads/*:refs/remotes/origin/*"], None, None)
        .expect("fetch");
    let parent = repo
        .find_reference("refs/remotes/origin/main")
        .ok()
        .and_then(|r| r.target())
        .map(|oid| repo.find_commit(oid).expect("parent commit"));
    if let Some(parent) = &parent {
        repo.reset(parent.as_object(), git2::ResetType::Hard, None)
            .expect("reset scratch");
    }

    for (path, contents) in files {
        let full = scratch.join(path);
        if let Some(dir) = full.parent() {
            std::fs::create_dir_all(dir).expect("mkdir");
        }
        std::fs::write(full, contents).expect("write");
    }
    let mut index = repo.index().expect("index");
    index
        .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
        .expect("add");
    index.write().expect("write index");
    let tree = repo
        .find_tree(index.write_tree().expect("tree"))
        .expect("find tree");
    let signature = git2::Signature::now("other", "other@example.com").expect("signature");
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo
        .commit(None, &signature, &signature, "remote edit", &tree, &parents)
        .expect("commit");
    repo.reference("refs/heads/main", oid, true, "remote edit")
        .expect("branch");
    repo.find_remote("origin")
        .expect("origin")
        .push(&["refs/heads/main:refs/heads/main"], None)
        .expect("push");
    oid.to_string()
}
