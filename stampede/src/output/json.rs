use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use stampede_core::{
    OutcomeClass, OutcomeEvent, RequestOutcome, RunSummary, ScenarioDefinition, StepStats,
    UserOutcome, UserStatus, WorkloadProfile,
};

use super::OutputFormatter;

pub(crate) struct JsonOutput {
    stream: bool,
}

impl JsonOutput {
    pub(crate) fn new(stream: bool) -> Self {
        Self { stream }
    }
}

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _: &Path, _: &ScenarioDefinition, _: &WorkloadProfile) {}

    fn on_event(&self, event: &OutcomeEvent) {
        if !self.stream {
            return;
        }
        match event {
            OutcomeEvent::Request(r) => emit_json_line(&build_request_line(r)),
            OutcomeEvent::User(u) => emit_json_line(&build_user_line(u)),
            OutcomeEvent::ExtractionWarning(w) => emit_json_line(&JsonWarningLine {
                kind: "extraction_warning",
                step: &w.step,
                key: &w.key,
                message: w.failure.to_string(),
            }),
        }
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        emit_json_line(&build_summary_line(summary));
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRequestLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub user_id: u64,
    pub step: &'a str,
    pub request_kind: &'a str,
    pub attempt: u32,
    /// `2xx`.. `5xx`, `transport_error` or `skipped`.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at_ms: f64,
    pub latency_ms: f64,
}

fn build_request_line(r: &RequestOutcome) -> JsonRequestLine<'_> {
    let (outcome, status, error) = match &r.class {
        OutcomeClass::Success { status } => (
            stampede_core::StatusClass::from_status(*status).to_string(),
            Some(*status),
            None,
        ),
        OutcomeClass::TransportError { kind, message } => (
            "transport_error".to_string(),
            None,
            Some(format!("{kind}: {message}")),
        ),
        OutcomeClass::Skipped { reason } => ("skipped".to_string(), None, Some(reason.clone())),
    };

    JsonRequestLine {
        kind: "request",
        scenario: &r.scenario,
        user_id: r.user_id,
        step: &r.step,
        request_kind: r.kind.as_ref(),
        attempt: r.attempt,
        outcome,
        status,
        error,
        started_at_ms: millis(r.started_at),
        latency_ms: millis(r.latency),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonUserLine<'a> {
    pub kind: &'static str,
    pub scenario: &'a str,
    pub user_id: u64,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub requests: u64,
    pub started_at_ms: f64,
    pub finished_at_ms: f64,
}

fn build_user_line(u: &UserOutcome) -> JsonUserLine<'_> {
    let (status, reason) = match &u.status {
        UserStatus::Completed => ("completed", None),
        UserStatus::Aborted(reason) => ("aborted", Some(reason.to_string())),
    };
    JsonUserLine {
        kind: "user",
        scenario: &u.scenario,
        user_id: u.user_id,
        status,
        reason,
        requests: u.requests,
        started_at_ms: millis(u.started_at),
        finished_at_ms: millis(u.finished_at),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonWarningLine<'a> {
    pub kind: &'static str,
    pub step: &'a str,
    pub key: &'a str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub scenario: String,
    pub users_started: u64,
    pub users_completed: u64,
    pub users_aborted: u64,
    pub aborts: BTreeMap<String, u64>,
    pub peak_active_users: u64,
    pub elapsed_secs: f64,
    pub stopped_early: bool,
    pub totals: JsonStepStats,
    pub steps: Vec<JsonStepStats>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStepStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub requests: u64,
    pub status_classes: BTreeMap<&'static str, u64>,
    pub transport_errors: BTreeMap<String, u64>,
    pub skipped: u64,
    pub extraction_warnings: u64,
    pub latency: JsonLatencySummary,
}

/// Microseconds.
#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stdev: Option<f64>,
    pub count: u64,
}

fn build_step_stats(step: Option<&str>, s: &StepStats) -> JsonStepStats {
    let l = &s.latency;
    JsonStepStats {
        step: step.map(str::to_string),
        requests: s.requests,
        status_classes: s
            .status_classes
            .iter()
            .map(|(class, n)| (<&'static str>::from(*class), *n))
            .collect(),
        transport_errors: s
            .transport_errors
            .iter()
            .map(|(kind, n)| (kind.to_string(), *n))
            .collect(),
        skipped: s.skipped,
        extraction_warnings: s.extraction_warnings,
        latency: JsonLatencySummary {
            p50: l.p50,
            p75: l.p75,
            p90: l.p90,
            p95: l.p95,
            p99: l.p99,
            min: l.min,
            max: l.max,
            mean: l.mean,
            stdev: l.stdev,
            count: l.count,
        },
    }
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    JsonSummaryLine {
        kind: "summary",
        scenario: summary.scenario.clone(),
        users_started: summary.users_started,
        users_completed: summary.users_completed,
        users_aborted: summary.users_aborted,
        aborts: summary.aborts.iter().cloned().collect(),
        peak_active_users: summary.peak_active_users,
        elapsed_secs: summary.elapsed.as_secs_f64(),
        stopped_early: summary.stopped_early,
        totals: build_step_stats(None, &summary.metrics.total),
        steps: summary
            .metrics
            .steps
            .iter()
            .map(|(name, s)| build_step_stats(Some(name), s))
            .collect(),
    }
}

fn millis(d: std::time::Duration) -> f64 {
    d.as_micros() as f64 / 1_000.0
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}
