use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HOME: &str = "/";
pub const PATH_LOGIN: &str = "/login";
pub const PATH_PROFILE: &str = "/profile";
pub const PATH_STATIC: &str = "/static/{*file}";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_ECHO: &str = "/echo";

pub const HOME_ETAG: &str = "\"home-v1\"";

const DEFAULT_SLOW_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    logins_total: Arc<AtomicU64>,
    authorized_total: Arc<AtomicU64>,
    unauthorized_total: Arc<AtomicU64>,
    not_modified_total: Arc<AtomicU64>,
    in_flight: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn logins_total(&self) -> u64 {
        self.logins_total.load(Ordering::Relaxed)
    }

    pub fn authorized_total(&self) -> u64 {
        self.authorized_total.load(Ordering::Relaxed)
    }

    pub fn unauthorized_total(&self) -> u64 {
        self.unauthorized_total.load(Ordering::Relaxed)
    }

    pub fn not_modified_total(&self) -> u64 {
        self.not_modified_total.load(Ordering::Relaxed)
    }

    /// Highest number of concurrently served `/slow` requests.
    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub home: String,
    pub login: String,
    pub profile: String,
    pub slow: String,
    pub echo: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            home: format!("{base_url}/"),
            login: format!("{base_url}{PATH_LOGIN}"),
            profile: format!("{base_url}{PATH_PROFILE}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            echo: format!("{base_url}{PATH_ECHO}"),
            base_url,
        }
    }

    pub fn asset(&self, file: &str) -> String {
        format!("{}/static/{file}", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: LoginUser,
}

#[derive(Debug, Serialize)]
struct LoginUser {
    name: String,
}

#[derive(Debug, Serialize)]
struct ProfileResponse {
    username: String,
}

fn token_for(username: &str) -> String {
    format!("tok-{username}")
}

fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
}

async fn handle_home(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    TestServerStats::inc(&stats.requests_total);

    if if_none_match(&headers) == Some(HOME_ETAG) {
        TestServerStats::inc(&stats.not_modified_total);
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, HOME_ETAG)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::ETAG, HOME_ETAG),
            (header::CONTENT_TYPE, "text/html"),
        ],
        "<html><body>home</body></html>",
    )
        .into_response()
}

async fn handle_static(
    State(stats): State<TestServerStats>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Response {
    TestServerStats::inc(&stats.requests_total);

    let etag = format!("\"asset-{file}\"");
    if if_none_match(&headers) == Some(etag.as_str()) {
        TestServerStats::inc(&stats.not_modified_total);
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (StatusCode::OK, [(header::ETAG, etag)], format!("asset {file}")).into_response()
}

async fn handle_login_preflight(State(stats): State<TestServerStats>) -> StatusCode {
    TestServerStats::inc(&stats.requests_total);
    StatusCode::NO_CONTENT
}

async fn handle_login(State(stats): State<TestServerStats>, body: Bytes) -> Response {
    TestServerStats::inc(&stats.requests_total);

    let req: LoginRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad json").into_response(),
    };
    if req.username.is_empty() || req.password.is_empty() {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }

    TestServerStats::inc(&stats.logins_total);
    let res = LoginResponse {
        token: token_for(&req.username),
        user: LoginUser { name: req.username },
    };

    match serde_json::to_vec(&res) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode error").into_response(),
    }
}

async fn handle_profile(State(stats): State<TestServerStats>, headers: HeaderMap) -> Response {
    TestServerStats::inc(&stats.requests_total);

    let username = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer tok-"))
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let Some(username) = username else {
        TestServerStats::inc(&stats.unauthorized_total);
        return (StatusCode::UNAUTHORIZED, "missing or invalid bearer token").into_response();
    };

    TestServerStats::inc(&stats.authorized_total);
    match serde_json::to_vec(&ProfileResponse { username }) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode error").into_response(),
    }
}

async fn handle_slow(
    State(stats): State<TestServerStats>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    TestServerStats::inc(&stats.requests_total);

    let ms = query
        .get("ms")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_SLOW_MS);

    stats.enter();
    sleep(Duration::from_millis(ms)).await;
    stats.leave();
    "slow"
}

async fn handle_echo(State(stats): State<TestServerStats>, body: Bytes) -> (StatusCode, Bytes) {
    TestServerStats::inc(&stats.requests_total);
    (StatusCode::OK, body)
}

pub fn router(stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_HOME, get(handle_home))
        .route(PATH_STATIC, get(handle_static))
        .route(
            PATH_LOGIN,
            post(handle_login).options(handle_login_preflight),
        )
        .route(PATH_PROFILE, get(handle_profile))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_ECHO, post(handle_echo))
        .with_state(stats)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        let base_url = format!("http://{addr}");
        let urls = TestServerUrls::new(base_url.clone());

        Ok(Self {
            addr,
            base_url,
            urls,
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
