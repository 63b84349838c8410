use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stampede_core::{OutcomeClass, OutcomeEvent, RunSummary, ScenarioDefinition, WorkloadProfile};

mod format;
mod progress;
mod summary;

use format::format_elapsed;
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: HumanProgress,
    counters: Counters,
}

#[derive(Default)]
struct Counters {
    max_offset_ms: AtomicU64,
    requests: AtomicU64,
    transport_errors: AtomicU64,
    users_completed: AtomicU64,
    users_aborted: AtomicU64,
    warnings: AtomicU64,
}

impl HumanReadableOutput {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            progress: HumanProgress::new(window),
            counters: Counters::default(),
        }
    }

    fn message(&self, elapsed: Duration) -> String {
        let c = &self.counters;
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        let mut msg = format!(
            "elapsed={} requests={} transport_errors={} users done={} aborted={}",
            format_elapsed(elapsed),
            load(&c.requests),
            load(&c.transport_errors),
            load(&c.users_completed),
            load(&c.users_aborted),
        );
        let warnings = load(&c.warnings);
        if warnings > 0 {
            msg.push_str(&format!(" warnings={warnings}"));
        }
        msg
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(
        &self,
        scenario_path: &Path,
        scenario: &ScenarioDefinition,
        profile: &WorkloadProfile,
    ) {
        println!("scenario: {} ({})", scenario.name, scenario_path.display());
        println!(
            "workload: {} rate={}/s duration={} jitter={} steps={} requests/user={}",
            profile.mode,
            profile.rate_per_second,
            format_elapsed(profile.duration),
            profile.jitter,
            scenario.steps.len(),
            scenario.request_count(),
        );
        println!();
    }

    fn on_event(&self, event: &OutcomeEvent) {
        let c = &self.counters;
        let offset = match event {
            OutcomeEvent::Request(r) => {
                if !matches!(r.class, OutcomeClass::Skipped { .. }) {
                    c.requests.fetch_add(1, Ordering::Relaxed);
                }
                if r.class.is_transport_error() {
                    c.transport_errors.fetch_add(1, Ordering::Relaxed);
                }
                Some(r.finished_at())
            }
            OutcomeEvent::User(u) => {
                let counter = if u.is_completed() {
                    &c.users_completed
                } else {
                    &c.users_aborted
                };
                counter.fetch_add(1, Ordering::Relaxed);
                Some(u.finished_at)
            }
            OutcomeEvent::ExtractionWarning(_) => {
                c.warnings.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        let offset_ms = offset.map_or(0, |d| d.as_millis() as u64);
        let prev = c.max_offset_ms.fetch_max(offset_ms, Ordering::Relaxed);
        let elapsed = Duration::from_millis(prev.max(offset_ms));
        self.progress.update(elapsed, self.message(elapsed));
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));
        Ok(())
    }
}
