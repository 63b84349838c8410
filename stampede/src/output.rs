use std::path::Path;
use std::sync::Arc;

use stampede_core::{OutcomeEvent, RunSummary, ScenarioDefinition, WorkloadProfile};

use crate::cli::OutputFormat;

mod human;
mod json;

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(
        &self,
        scenario_path: &Path,
        scenario: &ScenarioDefinition,
        profile: &WorkloadProfile,
    );

    /// Called for every event of the live outcome stream, in arrival order.
    fn on_event(&self, event: &OutcomeEvent);

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(
    format: OutputFormat,
    stream: bool,
    profile: &WorkloadProfile,
) -> Arc<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Arc::new(human::HumanReadableOutput::new(profile.duration)),
        OutputFormat::Json => Arc::new(json::JsonOutput::new(stream)),
    }
}
