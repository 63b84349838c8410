#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use stampede_core::{
    HttpRequest, HttpResponse, HttpTransport, OutcomeEvent, OutcomeReceiver, RequestOutcome,
    TransportError, UserOutcome,
};
use tokio::time::Instant;

type Responder = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// What the transport observed for one request.
#[derive(Debug, Clone)]
pub struct Seen {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub started: Instant,
    pub finished: Instant,
}

impl Seen {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// In-process transport with per-path latency and canned responses.
pub struct ScriptedTransport {
    routes: HashMap<String, (Duration, Responder)>,
    seen: Mutex<Vec<Seen>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn route(
        mut self,
        path: &str,
        delay: Duration,
        f: impl Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.routes.insert(path.to_string(), (delay, Box::new(f)));
        self
    }

    pub fn ok(self, path: &str, delay: Duration) -> Self {
        self.route(path, delay, |_| Ok(response(200, &[], "")))
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn seen_paths(&self) -> Vec<String> {
        self.seen().into_iter().map(|s| s.path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.seen().iter().filter(|s| s.path == path).count()
    }
}

impl HttpTransport for ScriptedTransport {
    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, TransportError> {
        let started = Instant::now();
        let path = url::Url::parse(&req.url)
            .map(|u| u.path().to_string())
            .unwrap_or_default();

        let delay = self.routes.get(&path).map_or(Duration::ZERO, |(d, _)| *d);
        tokio::time::sleep(delay).await;

        let res = match self.routes.get(&path) {
            Some((_, f)) => f(&req),
            None => Ok(response(404, &[], "not found")),
        };

        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Seen {
                path,
                headers: req.headers,
                body: req.body,
                started,
                finished: Instant::now(),
            });
        res
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect(),
        body: Bytes::from(body.to_string()),
    }
}

#[derive(Debug, Default)]
pub struct Collected {
    pub requests: Vec<RequestOutcome>,
    pub users: Vec<UserOutcome>,
    pub warnings: usize,
}

impl Collected {
    pub fn requests_for(&self, step: &str) -> Vec<&RequestOutcome> {
        self.requests.iter().filter(|r| &*r.step == step).collect()
    }
}

/// Drain an outcome stream whose senders have all been dropped.
pub fn collect(mut rx: OutcomeReceiver) -> Collected {
    let mut out = Collected::default();
    while let Ok(event) = rx.try_recv() {
        match event {
            OutcomeEvent::Request(r) => out.requests.push(r),
            OutcomeEvent::User(u) => out.users.push(u),
            OutcomeEvent::ExtractionWarning(_) => out.warnings += 1,
        }
    }
    out.users.sort_by_key(|u| u.user_id);
    out
}

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

pub fn approx(actual: Duration, expected: Duration) -> bool {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    diff <= ms(5)
}
