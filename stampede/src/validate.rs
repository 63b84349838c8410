use crate::cli::ValidateArgs;
use crate::exit_codes::ExitCode;
use crate::run_error::RunError;
use crate::scenario_yaml::{WorkloadOverrides, load_scenario};

pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let loaded = load_scenario(&args.scenario, None)
        .await
        .map_err(RunError::InvalidInput)?;
    let profile = loaded
        .workload
        .resolve(&WorkloadOverrides::default())
        .map_err(RunError::InvalidInput)?;

    let scenario = &loaded.scenario;
    println!(
        "ok: scenario `{}`: {} steps, {} requests per user",
        scenario.name,
        scenario.steps.len(),
        scenario.request_count()
    );
    match profile {
        Some(p) => println!(
            "workload: {} rate={}/s duration={} (~{} users)",
            p.mode,
            p.rate_per_second,
            humantime::format_duration(p.duration),
            p.expected_arrivals()
        ),
        None => println!("workload: not set (pass --rate and --duration to `stampede run`)"),
    }

    Ok(ExitCode::Success)
}
