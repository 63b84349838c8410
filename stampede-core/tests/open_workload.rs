mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedTransport, approx, collect, ms};
use stampede_core::{
    ArrivalSchedule, ConfigError, Error, HttpProtocol, MAX_RUN_DURATION, RequestStep, RunOptions,
    RunSummary, ScenarioDefinition, StopHandle, Template, WorkloadProfile, outcome_channel, run,
};

fn one_request_scenario() -> Arc<ScenarioDefinition> {
    Arc::new(
        ScenarioDefinition::new("open")
            .request(RequestStep::get("work", Template::literal("http://target.test/work"))),
    )
}

async fn run_with_latency(
    latency: Duration,
    profile: &WorkloadProfile,
) -> (RunSummary, Vec<Duration>) {
    let transport = Arc::new(ScriptedTransport::new().ok("/work", latency));
    let (tx, rx) = outcome_channel();
    let summary = run(
        one_request_scenario(),
        profile,
        transport,
        RunOptions {
            outcomes: Some(tx),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("run failed: {e}"));

    let starts = collect(rx).users.iter().map(|u| u.started_at).collect();
    (summary, starts)
}

#[tokio::test(start_paused = true)]
async fn slow_target_raises_concurrency_not_arrival_spacing() {
    let profile = WorkloadProfile::constant(10.0, Duration::from_secs(2));

    let (fast, fast_starts) = run_with_latency(ms(10), &profile).await;
    let (slow, slow_starts) = run_with_latency(Duration::from_secs(5), &profile).await;

    assert_eq!(fast.users_started, 20);
    assert_eq!(slow.users_started, 20);
    assert_eq!(fast_starts.len(), slow_starts.len());
    for (f, s) in fast_starts.iter().zip(&slow_starts) {
        assert!(approx(*f, *s), "arrival moved from {f:?} to {s:?}");
    }
    for (i, start) in slow_starts.iter().enumerate() {
        assert!(approx(*start, ms(100 * i as u64)), "user {i} started at {start:?}");
    }

    assert_eq!(fast.peak_active_users, 1);
    assert_eq!(slow.peak_active_users, 20);
    assert_eq!(slow.users_completed, 20);
}

#[tokio::test(start_paused = true)]
async fn randomized_arrivals_follow_the_seeded_schedule() {
    let profile = WorkloadProfile::randomized(4.0, Duration::from_secs(1)).with_seed(1234);
    let expected: Vec<Duration> = ArrivalSchedule::from_profile(&profile).collect();

    assert_eq!(expected.len(), 4);
    let mut distinct = expected.clone();
    distinct.dedup();
    assert_eq!(distinct.len(), 4);
    assert!(expected.iter().all(|d| *d < Duration::from_secs(1)));

    let (summary, starts) = run_with_latency(ms(1), &profile).await;
    assert_eq!(summary.users_started, 4);
    for (got, want) in starts.iter().zip(&expected) {
        assert!(approx(*got, *want), "started at {got:?}, scheduled {want:?}");
    }

    let again: Vec<Duration> = ArrivalSchedule::from_profile(&profile).collect();
    assert_eq!(expected, again);
}

#[tokio::test(start_paused = true)]
async fn cutoff_stops_arrivals_but_running_users_drain() {
    let profile = WorkloadProfile::constant(10.0, Duration::from_secs(5));
    let (summary, starts) = run_with_latency(Duration::from_secs(3), &profile).await;

    assert_eq!(summary.users_started, 50);
    assert_eq!(summary.users_completed, 50);
    assert!(starts.iter().all(|s| *s < Duration::from_secs(5)));

    let last = starts.last().copied().unwrap_or_default();
    assert!(approx(last, ms(4_900)));
    assert!(approx(summary.elapsed, ms(7_900)), "elapsed {:?}", summary.elapsed);
    assert_eq!(summary.metrics.total.requests, 50);
}

#[tokio::test(start_paused = true)]
async fn stop_handle_closes_the_window_early() {
    let stop = StopHandle::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ms(1_050)).await;
            stop.stop();
        });
    }

    let transport = Arc::new(ScriptedTransport::new().ok("/work", ms(500)));
    let summary = run(
        one_request_scenario(),
        &WorkloadProfile::constant(10.0, Duration::from_secs(60)),
        transport,
        RunOptions {
            stop: Some(stop),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert!(summary.stopped_early);
    assert_eq!(summary.users_started, 11);
    assert_eq!(summary.users_completed, 11);
    assert!(summary.elapsed < Duration::from_secs(2));
}

#[tokio::test]
async fn invalid_profile_fails_before_any_user_starts() {
    let transport = Arc::new(ScriptedTransport::new().ok("/work", ms(1)));
    let err = run(
        one_request_scenario(),
        &WorkloadProfile::constant(0.0, Duration::from_secs(1)),
        transport.clone(),
        RunOptions::default(),
    )
    .await
    .err();
    assert!(matches!(err, Some(Error::Config(ConfigError::InvalidRate))));

    let err = run(
        Arc::new(
            ScenarioDefinition::new("relative")
                .request(RequestStep::get("work", Template::literal("/work"))),
        ),
        &WorkloadProfile::constant(1.0, Duration::from_secs(1)),
        transport.clone(),
        RunOptions {
            protocol: HttpProtocol::new(),
            ..RunOptions::default()
        },
    )
    .await
    .err();
    assert!(matches!(
        err,
        Some(Error::Config(ConfigError::RelativeUrlWithoutBase { .. }))
    ));
    assert!(transport.seen().is_empty());
}

#[tokio::test]
async fn unrepresentable_duration_is_a_config_error() {
    let transport = Arc::new(ScriptedTransport::new().ok("/work", ms(1)));
    for duration in [Duration::from_secs(u64::MAX), MAX_RUN_DURATION + ms(1)] {
        let err = run(
            one_request_scenario(),
            &WorkloadProfile::constant(1.0, duration),
            transport.clone(),
            RunOptions::default(),
        )
        .await
        .err();
        assert!(
            matches!(err, Some(Error::Config(ConfigError::InvalidDuration))),
            "{duration:?} gave {err:?}"
        );
    }
    assert!(transport.seen().is_empty());
}
