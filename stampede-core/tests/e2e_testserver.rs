use std::sync::Arc;
use std::time::Duration;

use stampede_core::{
    BodySource, ExtractionRule, HttpClient, HttpProtocol, RequestStep, RunOptions,
    ScenarioDefinition, StatusClass, Template, WorkloadProfile, run,
};
use stampede_testserver::TestServer;

fn tpl(s: &str) -> Template {
    Template::parse(s).unwrap_or_else(|e| panic!("template {s:?}: {e}"))
}

#[tokio::test]
async fn login_profile_and_revalidation_against_a_live_server() {
    let server = TestServer::start()
        .await
        .unwrap_or_else(|e| panic!("failed to start test server: {e}"));

    let protocol = HttpProtocol::new()
        .with_base_url(server.base_url())
        .unwrap_or_else(|e| panic!("base url: {e}"))
        .with_default_header("accept", tpl("*/*"))
        .with_default_header("user-agent", tpl("stampede-e2e"));

    let home = RequestStep::get("home", tpl("/"))
        .with_extract(vec![ExtractionRule::header("ETag", "homeEtag")])
        .with_resource(RequestStep::get("app.js", tpl("/static/app.js")))
        .with_resource(RequestStep::get("app.css", tpl("/static/app.css")));

    let login = RequestStep::new("login", http::Method::POST, tpl("/login"))
        .with_header("content-type", tpl("application/json"))
        .with_body(BodySource::Bytes(
            r#"{"username":"ann","password":"secret"}"#.into(),
        ))
        .with_extract(vec![
            ExtractionRule::json("token", "authToken").unwrap_or_else(|e| panic!("{e}")),
            ExtractionRule::json("user.name", "userName").unwrap_or_else(|e| panic!("{e}")),
        ]);

    let profile = RequestStep::get("profile", tpl("/profile"))
        .with_header("authorization", tpl("Bearer ${authToken}"));

    let revalidate = RequestStep::get("home revalidate", tpl("/"))
        .with_header("if-none-match", tpl("${homeEtag}"));

    let scenario = ScenarioDefinition::new("browse and log in")
        .request(home)
        .pause(Duration::from_millis(20))
        .request(login)
        .request(profile)
        .request(revalidate);

    let summary = run(
        Arc::new(scenario),
        &WorkloadProfile::randomized(5.0, Duration::from_secs(1)).with_seed(9),
        Arc::new(HttpClient::default()),
        RunOptions {
            protocol,
            request_timeout: Duration::from_secs(5),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(summary.users_started, 5);
    assert_eq!(summary.users_completed, 5, "aborts: {:?}", summary.aborts);

    let stats = server.stats();
    assert_eq!(stats.logins_total(), 5);
    assert_eq!(stats.authorized_total(), 5);
    assert_eq!(stats.unauthorized_total(), 0);
    assert_eq!(stats.not_modified_total(), 5);
    // home + 2 assets + login + profile + revalidation, per user
    assert_eq!(stats.requests_total(), 30);

    let step = |name: &str| {
        summary
            .metrics
            .step(name)
            .unwrap_or_else(|| panic!("no stats for {name}"))
    };
    assert_eq!(step("profile").status_class(StatusClass::Success), 5);
    assert_eq!(step("home revalidate").status_class(StatusClass::Redirection), 5);
    assert_eq!(step("app.css").requests, 5);
    assert_eq!(summary.metrics.total.extraction_warnings, 0);
    assert_eq!(summary.metrics.total.latency.count, 30);

    server.shutdown().await;
}

#[tokio::test]
async fn unreachable_target_is_a_transport_error_not_a_crash() {
    let protocol = HttpProtocol::new()
        .with_base_url("http://127.0.0.1:9")
        .unwrap_or_else(|e| panic!("base url: {e}"));
    let scenario =
        ScenarioDefinition::new("down").request(RequestStep::get("home", tpl("/")));

    let summary = run(
        Arc::new(scenario),
        &WorkloadProfile::constant(2.0, Duration::from_secs(1)),
        Arc::new(HttpClient::new(Some(Duration::from_millis(500)))),
        RunOptions {
            protocol,
            request_timeout: Duration::from_secs(2),
            ..RunOptions::default()
        },
    )
    .await
    .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(summary.users_started, 2);
    assert!(summary.all_users_aborted());
    assert_eq!(summary.metrics.total.transport_errors_total(), 2);
}
