use std::sync::Arc;

use anyhow::Context as _;
use stampede_core::{HttpClient, RunOptions, StopHandle, outcome_channel};

use crate::cli::RunArgs;
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::scenario_yaml::{WorkloadOverrides, load_scenario};

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let loaded = load_scenario(&args.scenario, args.base_url.as_deref())
        .await
        .map_err(RunError::InvalidInput)?;

    let profile = loaded
        .workload
        .resolve(&overrides(&args))
        .map_err(RunError::InvalidInput)?
        .ok_or_else(|| {
            RunError::InvalidInput(anyhow::anyhow!(
                "no workload: set `workload.ratePerSecond` and `workload.duration` in {} \
                 or pass --rate and --duration",
                args.scenario.display()
            ))
        })?;

    let out = output::formatter(args.output, args.stream, &profile);
    out.print_header(&args.scenario, &loaded.scenario, &profile);

    let stop = StopHandle::new();
    spawn_ctrl_c(stop.clone());

    let (tx, mut rx) = outcome_channel();
    let printer = {
        let out = out.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                out.on_event(&event);
            }
        })
    };

    let mut options = RunOptions {
        protocol: loaded.protocol,
        outcomes: Some(tx),
        stop: Some(stop),
        ..RunOptions::default()
    };
    if let Some(timeout) = args.timeout {
        options.request_timeout = timeout;
    }
    if let Some(retries) = args.retries {
        options.max_transport_retries = retries;
    }

    let transport = Arc::new(HttpClient::default());
    let summary = stampede_core::run(Arc::new(loaded.scenario), &profile, transport, options)
        .await
        .map_err(|e| RunError::InvalidInput(e.into()))?;

    // Every sender is gone once the run returns; this drains what is still buffered.
    printer
        .await
        .context("outcome printer task failed")
        .map_err(RunError::RuntimeError)?;

    out.print_summary(&summary).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_summary(&summary))
}

fn overrides(args: &RunArgs) -> WorkloadOverrides {
    WorkloadOverrides {
        rate: args.rate,
        duration: args.duration,
        mode: args.mode,
        jitter: args.jitter,
        seed: args.seed,
    }
}

/// First Ctrl-C closes the arrival window; users already running drain normally.
fn spawn_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted: no new users will start, waiting for running users");
            stop.stop();
        }
    });
}
