use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::{HttpProtocol, RunOptions, WorkloadProfile};
use crate::error::Result;
use crate::executor::HttpExecutor;
use crate::extract::ExtractionWarning;
use crate::injector;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::outcome::{OutcomeEvent, OutcomeSender, RequestOutcome, UserOutcome};
use crate::scenario::ScenarioDefinition;
use crate::transport::HttpTransport;

/// External hard stop. Same effect as reaching the profile's duration: no new arrivals,
/// running users drain.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    pub users_started: u64,
    pub users_completed: u64,
    pub users_aborted: u64,
    /// Abort counts keyed by reason label, sorted.
    pub aborts: Vec<(String, u64)>,
    pub peak_active_users: u64,
    pub elapsed: Duration,
    /// Set when the arrival window was cut short by a [`StopHandle`].
    pub stopped_early: bool,
    pub metrics: MetricsSnapshot,
}

impl RunSummary {
    pub fn all_users_aborted(&self) -> bool {
        self.users_started > 0 && self.users_aborted == self.users_started
    }
}

/// State shared by every virtual user of one run.
pub(crate) struct RunContext<T> {
    pub scenario: Arc<ScenarioDefinition>,
    pub scenario_name: Arc<str>,
    pub protocol: HttpProtocol,
    pub executor: HttpExecutor<T>,
    pub max_transport_retries: u32,
    pub metrics: MetricsAggregator,
    outcomes: Option<OutcomeSender>,
    run_start: Instant,
}

impl<T: HttpTransport> RunContext<T> {
    pub(crate) fn run_start(&self) -> Instant {
        self.run_start
    }

    /// Offset from run start.
    pub(crate) fn elapsed(&self) -> Duration {
        self.run_start.elapsed()
    }

    fn emit(&self, event: OutcomeEvent) {
        if let Some(tx) = &self.outcomes {
            // A dropped receiver only means nobody is watching live.
            let _ = tx.send(event);
        }
    }

    pub(crate) fn record_request(&self, outcome: RequestOutcome) {
        self.metrics.record_request(&outcome);
        self.emit(OutcomeEvent::Request(outcome));
    }

    pub(crate) fn record_warning(&self, user_id: u64, warning: ExtractionWarning) {
        tracing::warn!(
            scenario = %self.scenario_name,
            user_id,
            step = %warning.step,
            key = %warning.key,
            "extraction failed: {}",
            warning.failure
        );
        self.metrics.record_warning(&warning);
        self.emit(OutcomeEvent::ExtractionWarning(warning));
    }

    pub(crate) fn record_user(&self, outcome: UserOutcome) {
        self.metrics.record_user(&outcome);
        self.emit(OutcomeEvent::User(outcome));
    }
}

/// Drive `scenario` under `profile` until the arrival window closes and every started user
/// has finished.
///
/// Only invalid configuration fails the run; per-user failures are counted in the summary.
pub async fn run<T: HttpTransport>(
    scenario: Arc<ScenarioDefinition>,
    profile: &WorkloadProfile,
    transport: Arc<T>,
    options: RunOptions,
) -> Result<RunSummary> {
    profile.validate()?;
    options.validate()?;
    scenario.validate(&options.protocol)?;

    let run_start = Instant::now();
    let stop = options.stop.clone().unwrap_or_default();

    tracing::info!(
        scenario = %scenario.name,
        mode = %profile.mode,
        rate = profile.rate_per_second,
        duration = ?profile.duration,
        "run starting"
    );

    let ctx = Arc::new(RunContext {
        scenario_name: Arc::from(scenario.name.as_str()),
        scenario,
        protocol: options.protocol,
        executor: HttpExecutor::new(transport, options.request_timeout, run_start),
        max_transport_retries: options.max_transport_retries,
        metrics: MetricsAggregator::new(),
        outcomes: options.outcomes,
        run_start,
    });

    let injected = injector::inject(ctx.clone(), profile, &stop).await;

    let metrics = &ctx.metrics;
    let summary = RunSummary {
        scenario: ctx.scenario.name.clone(),
        users_started: injected.users_started,
        users_completed: metrics.users("completed"),
        users_aborted: metrics.users("aborted"),
        aborts: metrics.aborts_by_reason(),
        peak_active_users: metrics.peak_active_users(),
        elapsed: run_start.elapsed(),
        stopped_early: injected.stopped_early,
        metrics: metrics.snapshot(),
    };

    tracing::info!(
        scenario = %summary.scenario,
        users_started = summary.users_started,
        users_completed = summary.users_completed,
        users_aborted = summary.users_aborted,
        elapsed = ?summary.elapsed,
        "run finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_handle_wakes_waiters_and_stays_stopped() {
        let stop = StopHandle::new();
        assert!(!stop.is_stopped());

        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.stopped().await })
        };
        tokio::task::yield_now().await;
        stop.stop();

        assert!(waiter.await.is_ok());
        assert!(stop.is_stopped());
        // Already stopped: resolves immediately.
        stop.stopped().await;
    }
}
