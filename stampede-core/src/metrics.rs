use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use stampede_http::HttpTransportErrorKind;
use stampede_metrics::{
    HistogramSummary, MetricHandle, MetricId, MetricKind, Query, Registry,
};

use crate::extract::ExtractionWarning;
use crate::outcome::{OutcomeClass, RequestOutcome, UserOutcome, UserStatus};

pub const METRIC_REQUESTS_TOTAL: &str = "requests_total";
pub const METRIC_TRANSPORT_ERRORS_TOTAL: &str = "transport_errors_total";
pub const METRIC_REQUEST_LATENCY_US: &str = "request_latency_us";
pub const METRIC_EXTRACTION_WARNINGS_TOTAL: &str = "extraction_warnings_total";
pub const METRIC_USERS_TOTAL: &str = "users_total";
pub const METRIC_USERS_ABORTED_TOTAL: &str = "users_aborted_total";
pub const METRIC_ACTIVE_USERS: &str = "active_users";

pub const TAG_STEP: &str = "step";
pub const TAG_KIND: &str = "kind";
pub const TAG_OUTCOME: &str = "outcome";
pub const TAG_ERROR: &str = "error";
pub const TAG_STATE: &str = "state";
pub const TAG_REASON: &str = "reason";

const OUTCOME_TRANSPORT_ERROR: &str = "transport_error";
const OUTCOME_SKIPPED: &str = "skipped";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
pub enum StatusClass {
    #[strum(serialize = "1xx")]
    Informational,
    #[strum(serialize = "2xx")]
    Success,
    #[strum(serialize = "3xx")]
    Redirection,
    #[strum(serialize = "4xx")]
    ClientError,
    #[strum(serialize = "5xx")]
    ServerError,
    #[strum(serialize = "other")]
    Other,
}

impl StatusClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            100..=199 => Self::Informational,
            200..=299 => Self::Success,
            300..=399 => Self::Redirection,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Other,
        }
    }
}

/// Aggregated request statistics for one step, or for the whole run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    /// Attempts that reached the transport (responses plus transport errors).
    pub requests: u64,
    pub status_classes: BTreeMap<StatusClass, u64>,
    pub transport_errors: BTreeMap<HttpTransportErrorKind, u64>,
    pub skipped: u64,
    pub extraction_warnings: u64,
    /// Microseconds.
    pub latency: HistogramSummary,
}

impl StepStats {
    pub fn status_class(&self, class: StatusClass) -> u64 {
        self.status_classes.get(&class).copied().unwrap_or(0)
    }

    pub fn transport_errors_total(&self) -> u64 {
        self.transport_errors.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub total: StepStats,
    /// Ordered by step name.
    pub steps: Vec<(String, StepStats)>,
}

impl MetricsSnapshot {
    pub fn step(&self, name: &str) -> Option<&StepStats> {
        self.steps.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

/// Streaming aggregation of request and user outcomes.
///
/// Every record is an append to a tagged counter, gauge or histogram, so any number of
/// virtual users may record concurrently.
#[derive(Debug)]
pub struct MetricsAggregator {
    registry: Registry,
    requests_total: MetricId,
    transport_errors_total: MetricId,
    request_latency_us: MetricId,
    extraction_warnings_total: MetricId,
    users_total: MetricId,
    users_aborted_total: MetricId,
    active_users: MetricId,
    peak_active_users: AtomicU64,
}

/// Keeps one user in the `active_users` gauge while alive.
#[derive(Debug)]
#[must_use = "the user stops counting as active as soon as this is dropped"]
pub struct ActiveUser {
    gauge: Option<MetricHandle>,
}

impl Drop for ActiveUser {
    fn drop(&mut self) {
        if let Some(h) = &self.gauge {
            h.add_gauge(-1);
        }
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        let registry = Registry::default();
        Self {
            requests_total: registry.register(METRIC_REQUESTS_TOTAL, MetricKind::Counter),
            transport_errors_total: registry
                .register(METRIC_TRANSPORT_ERRORS_TOTAL, MetricKind::Counter),
            request_latency_us: registry.register(METRIC_REQUEST_LATENCY_US, MetricKind::Histogram),
            extraction_warnings_total: registry
                .register(METRIC_EXTRACTION_WARNINGS_TOTAL, MetricKind::Counter),
            users_total: registry.register(METRIC_USERS_TOTAL, MetricKind::Counter),
            users_aborted_total: registry.register(METRIC_USERS_ABORTED_TOTAL, MetricKind::Counter),
            active_users: registry.register(METRIC_ACTIVE_USERS, MetricKind::Gauge),
            peak_active_users: AtomicU64::new(0),
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn bump(&self, metric: MetricId, tags: &[(&str, &str)]) {
        if let Some(h) = self.registry.handle(metric, self.registry.tags(tags)) {
            h.increment(1);
        }
    }

    pub fn record_request(&self, outcome: &RequestOutcome) {
        let step = &*outcome.step;
        let kind = outcome.kind.as_ref();

        let class = match &outcome.class {
            OutcomeClass::Success { status } => {
                <&'static str>::from(StatusClass::from_status(*status))
            }
            OutcomeClass::TransportError { kind: error, .. } => {
                let error = error.to_string();
                self.bump(
                    self.transport_errors_total,
                    &[(TAG_STEP, step), (TAG_ERROR, error.as_str())],
                );
                OUTCOME_TRANSPORT_ERROR
            }
            OutcomeClass::Skipped { .. } => OUTCOME_SKIPPED,
        };
        self.bump(
            self.requests_total,
            &[(TAG_STEP, step), (TAG_KIND, kind), (TAG_OUTCOME, class)],
        );

        if !matches!(outcome.class, OutcomeClass::Skipped { .. })
            && let Some(h) = self
                .registry
                .handle(self.request_latency_us, self.registry.tags(&[(TAG_STEP, step)]))
        {
            h.observe(u64::try_from(outcome.latency.as_micros()).unwrap_or(u64::MAX));
        }
    }

    pub fn record_warning(&self, warning: &ExtractionWarning) {
        self.bump(self.extraction_warnings_total, &[(TAG_STEP, &*warning.step)]);
    }

    /// Count a user as started and active. It stays active until the guard drops, which
    /// also happens when its task panics.
    pub fn user_started(&self) -> ActiveUser {
        self.bump(self.users_total, &[(TAG_STATE, "started")]);
        let gauge = self
            .registry
            .handle(self.active_users, self.registry.tags(&[]));
        if let Some(h) = &gauge {
            let now = u64::try_from(h.add_gauge(1)).unwrap_or(0);
            self.peak_active_users.fetch_max(now, Ordering::Relaxed);
        }
        ActiveUser { gauge }
    }

    pub fn record_user(&self, outcome: &UserOutcome) {
        match &outcome.status {
            UserStatus::Completed => self.bump(self.users_total, &[(TAG_STATE, "completed")]),
            UserStatus::Aborted(reason) => {
                self.bump(self.users_total, &[(TAG_STATE, "aborted")]);
                self.bump(self.users_aborted_total, &[(TAG_REASON, reason.label())]);
            }
        }
    }

    pub fn users(&self, state: &str) -> u64 {
        self.registry
            .query(self.users_total)
            .where_eq(TAG_STATE, state)
            .sum_counter_total()
    }

    pub fn active_users(&self) -> u64 {
        self.registry
            .handle(self.active_users, self.registry.tags(&[]))
            .map_or(0, |h| u64::try_from(h.gauge_value()).unwrap_or(0))
    }

    pub fn peak_active_users(&self) -> u64 {
        self.peak_active_users.load(Ordering::Relaxed)
    }

    /// Abort counts keyed by reason label.
    pub fn aborts_by_reason(&self) -> Vec<(String, u64)> {
        self.registry
            .query(self.users_aborted_total)
            .sum_counter_by(TAG_REASON)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let step_key = self.registry.key(TAG_STEP);
        let steps = self
            .registry
            .tag_values(self.requests_total, step_key)
            .into_iter()
            .map(|step| {
                let stats = self.step_stats(Some(&*step));
                (step.to_string(), stats)
            })
            .collect();

        MetricsSnapshot {
            total: self.step_stats(None),
            steps,
        }
    }

    fn step_stats(&self, step: Option<&str>) -> StepStats {
        let mut stats = StepStats::default();
        for (outcome, n) in
            scoped(self.registry.query(self.requests_total), step).sum_counter_by(TAG_OUTCOME)
        {
            match outcome.as_str() {
                OUTCOME_SKIPPED => stats.skipped += n,
                OUTCOME_TRANSPORT_ERROR => stats.requests += n,
                other => {
                    stats.requests += n;
                    if let Ok(class) = other.parse::<StatusClass>() {
                        *stats.status_classes.entry(class).or_default() += n;
                    }
                }
            }
        }

        for (error, n) in
            scoped(self.registry.query(self.transport_errors_total), step).sum_counter_by(TAG_ERROR)
        {
            if let Ok(kind) = error.parse::<HttpTransportErrorKind>() {
                *stats.transport_errors.entry(kind).or_default() += n;
            }
        }

        stats.extraction_warnings =
            scoped(self.registry.query(self.extraction_warnings_total), step).sum_counter_total();
        stats.latency =
            scoped(self.registry.query(self.request_latency_us), step).merge_histogram_total();
        stats
    }
}

fn scoped<'a>(q: Query<'a>, step: Option<&str>) -> Query<'a> {
    match step {
        Some(step) => q.where_eq(TAG_STEP, step),
        None => q,
    }
}
