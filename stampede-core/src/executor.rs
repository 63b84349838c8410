use std::sync::Arc;
use std::time::{Duration, SystemTime};

use stampede_http::HttpTransportErrorKind;
use tokio::time::Instant;

use crate::extract::{ExtractionRule, ExtractionWarning, SessionUpdates, extract};
use crate::outcome::OutcomeClass;
use crate::resolve::ResolvedRequest;
use crate::transport::{HttpTransport, TransportError};

/// Result of one request attempt, before it is attributed to a user.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub class: OutcomeClass,
    /// Offset from run start.
    pub started_at: Duration,
    pub latency: Duration,
    pub timestamp: SystemTime,
    pub updates: SessionUpdates,
    pub warnings: Vec<ExtractionWarning>,
}

/// Issues resolved requests through the transport with the run's timeout.
pub(crate) struct HttpExecutor<T> {
    transport: Arc<T>,
    timeout: Duration,
    run_start: Instant,
}

impl<T> Clone for HttpExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            timeout: self.timeout,
            run_start: self.run_start,
        }
    }
}

impl<T: HttpTransport> HttpExecutor<T> {
    pub(crate) fn new(transport: Arc<T>, timeout: Duration, run_start: Instant) -> Self {
        Self {
            transport,
            timeout,
            run_start,
        }
    }

    /// One attempt. Extraction runs on any response; a transport error yields no updates.
    pub(crate) async fn execute(&self, req: &ResolvedRequest, rules: &[ExtractionRule]) -> Attempt {
        let start = Instant::now();
        let timestamp = SystemTime::now();

        // The transport owns the timeout; this bound only catches transports that ignore it.
        let result = match tokio::time::timeout(
            self.timeout,
            self.transport.execute(req.to_http_request(self.timeout)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::new(
                HttpTransportErrorKind::Timeout,
                format!("http request timed out after {:?}", self.timeout),
            )),
        };
        let latency = start.elapsed();

        let (class, updates, warnings) = match result {
            Ok(res) => {
                let (updates, warnings) = extract(&req.step, rules, &res);
                (OutcomeClass::Success { status: res.status }, updates, warnings)
            }
            Err(err) => (
                OutcomeClass::TransportError {
                    kind: err.kind,
                    message: err.message,
                },
                SessionUpdates::new(),
                Vec::new(),
            ),
        };

        Attempt {
            class,
            started_at: start.saturating_duration_since(self.run_start),
            latency,
            timestamp,
            updates,
            warnings,
        }
    }
}
