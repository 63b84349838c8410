use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;

use crate::config::{InjectionMode, JitterPolicy, WorkloadProfile, arrivals_before};
use crate::run::{RunContext, StopHandle};
use crate::runner::VirtualUser;
use crate::transport::HttpTransport;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Arrival offsets from run start, in ascending order.
///
/// Generated one one-second bucket at a time, so a long run never holds its whole schedule.
#[derive(Debug)]
pub struct ArrivalSchedule {
    rate: f64,
    duration: f64,
    mode: InjectionMode,
    jitter: JitterPolicy,
    rng: StdRng,
    /// Constant mode: next arrival index.
    next_index: u64,
    /// Uniform mode: next bucket to fill, and the offsets left in the current one.
    next_bucket: u64,
    pending: VecDeque<Duration>,
    /// Poisson mode: time of the last arrival, in seconds.
    clock: f64,
}

impl ArrivalSchedule {
    pub fn new(profile: &WorkloadProfile, rng: StdRng) -> Self {
        Self {
            rate: profile.rate_per_second,
            duration: profile.duration.as_secs_f64(),
            mode: profile.mode,
            jitter: profile.jitter,
            rng,
            next_index: 0,
            next_bucket: 0,
            pending: VecDeque::new(),
            clock: 0.0,
        }
    }

    /// Seeded from `profile.seed`, or from the OS when unset.
    pub fn from_profile(profile: &WorkloadProfile) -> Self {
        let rng = match profile.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(profile, rng)
    }

    fn next_constant(&mut self) -> Option<Duration> {
        if self.next_index >= arrivals_before(self.rate, self.duration) {
            return None;
        }
        let at = self.next_index as f64 / self.rate;
        self.next_index += 1;
        Some(Duration::from_secs_f64(at))
    }

    fn next_uniform(&mut self) -> Option<Duration> {
        while self.pending.is_empty() {
            let start = self.next_bucket as f64;
            if start >= self.duration {
                return None;
            }
            let end = (start + 1.0).min(self.duration);
            self.next_bucket += 1;

            let count = arrivals_before(self.rate, end) - arrivals_before(self.rate, start);
            self.fill_bucket(start, end, count);
        }
        self.pending.pop_front()
    }

    /// `count` distinct nanosecond offsets drawn uniformly from `[start, end)`.
    fn fill_bucket(&mut self, start: f64, end: f64, count: u64) {
        let lo = (start * NANOS_PER_SEC as f64) as u64;
        let hi = (end * NANOS_PER_SEC as f64) as u64;
        if hi <= lo {
            return;
        }
        let count = count.min(hi - lo);

        let mut offsets = BTreeSet::new();
        while (offsets.len() as u64) < count {
            offsets.insert(self.rng.random_range(lo..hi));
        }
        self.pending
            .extend(offsets.into_iter().map(Duration::from_nanos));
    }

    fn next_poisson(&mut self) -> Option<Duration> {
        // Inverse-CDF draw of an exponential gap with mean 1/rate.
        let u: f64 = self.rng.random();
        self.clock += -(1.0 - u).ln() / self.rate;
        (self.clock < self.duration).then(|| Duration::from_secs_f64(self.clock))
    }
}

impl Iterator for ArrivalSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        match (self.mode, self.jitter) {
            (InjectionMode::ConstantRate, _) => self.next_constant(),
            (InjectionMode::ConstantRateRandomized, JitterPolicy::UniformInBucket) => {
                self.next_uniform()
            }
            (InjectionMode::ConstantRateRandomized, JitterPolicy::Poisson) => self.next_poisson(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InjectReport {
    pub users_started: u64,
    pub stopped_early: bool,
}

/// Start one virtual user per scheduled arrival without waiting for any of them, then
/// drain every started user once the window closes.
pub(crate) async fn inject<T: HttpTransport>(
    ctx: Arc<RunContext<T>>,
    profile: &WorkloadProfile,
    stop: &StopHandle,
) -> InjectReport {
    let start = ctx.run_start();
    let cutoff = start + profile.duration;
    let mut report = InjectReport::default();
    let mut users = JoinSet::new();

    for offset in ArrivalSchedule::from_profile(profile) {
        let at = start + offset;
        if at >= cutoff {
            break;
        }

        tokio::select! {
            biased;
            () = stop.stopped() => {
                report.stopped_early = true;
                break;
            }
            () = tokio::time::sleep_until(at) => {}
        }

        let id = report.users_started;
        report.users_started += 1;
        let ctx = ctx.clone();
        users.spawn(async move { VirtualUser::new(id, ctx).run().await });

        // Reap finished users so the set only holds running ones.
        while let Some(done) = users.try_join_next() {
            if let Err(err) = done {
                tracing::error!(error = %err, "virtual user task failed");
            }
        }
    }

    tracing::info!(
        scenario = %ctx.scenario_name,
        users_started = report.users_started,
        running = users.len(),
        stopped_early = report.stopped_early,
        "arrival window closed, draining running users"
    );

    while let Some(done) = users.join_next().await {
        if let Err(err) = done {
            tracing::error!(error = %err, "virtual user task failed");
        }
    }

    report
}
