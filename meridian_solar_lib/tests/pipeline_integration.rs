use std::sync::Arc;

use chrono::NaiveDate;
use meridian_solar_lib::{
    Config, Coordinator, CycleOutcome, ExtractionPatterns, ReadingField, Tier,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOGIN_PAGE: &str = r#"<html><body>
<h1>Sign in</h1>
<form action="/session" method="post">
  <input type="hidden" name="authenticity_token" value="tok123">
  <input type="email" name="email">
  <input type="password" name="password">
</form></body></html>"#;

const DASHBOARD: &str = r#"<html><h1>My account</h1>
<p>Anytime rate: 28.5c/kWh</p>
<script>fetch("/api/usage/daily");</script></html>"#;

const USAGE_PAGE: &str = "<html><h2>Usage chart</h2><p>Average daily use: 14.2 kWh</p></html>";

const FEED_IN_PAGE: &str =
    r#"<html><h2>Feed-in heatmap</h2><a href="/feed_in_report.csv">Download CSV</a></html>"#;

fn csv_row(element: &str, date: &str, slot_values: &[(usize, f64)]) -> String {
    let mut slots = vec!["0".to_string(); 48];
    for (slot, value) in slot_values {
        slots[*slot] = value.to_string();
    }
    format!("0001234567AB123,M1,{},{},{}", element, date, slots.join(","))
}

fn export_body() -> String {
    [
        "ICP,Meter,Element,Date,values".to_string(),
        csv_row("Consumption", "31/12/2023", &[(0, 10.0)]),
        csv_row("Feed-in", "1/1/2024", &[(20, 1.5), (24, 2.5), (30, 0.5)]),
        csv_row("Consumption", "1/1/2024", &[(0, 3.0), (40, 5.0)]),
    ]
    .join("\n")
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn config_for(server: &MockServer) -> Config {
    Config {
        username: "user@example.com".into(),
        password: "s3cret".into(),
        candidate_urls: vec![format!("{}/login", server.uri())],
        ..Config::default()
    }
}

fn coordinator_for(server: &MockServer) -> Coordinator {
    let patterns = Arc::new(ExtractionPatterns::embedded().unwrap());
    Coordinator::with_patterns(&config_for(server), patterns).unwrap()
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_portal(server: &MockServer) {
    mount_page(server, "/login", LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/dashboard"))
        .mount(server)
        .await;
    mount_page(server, "/", DASHBOARD).await;
}

async fn mount_export(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/feed_in_report.csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_string(export_body()),
        )
        .mount(server)
        .await;
}

// ============================================================================
// Tier 1: CSV export
// ============================================================================

#[tokio::test]
async fn csv_tier_produces_complete_reading() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_export(&server).await;
    mount_page(&server, "/usage", USAGE_PAGE).await;

    let coordinator = coordinator_for(&server);
    let outcome = coordinator.refresh_on(today()).await;

    let CycleOutcome::Complete { reading } = outcome else {
        panic!("Expected Complete, got: {:?}", outcome);
    };
    assert_eq!(reading.current_rate, 0.285);
    assert_eq!(reading.next_rate, 0.285);
    assert_eq!(reading.daily_feed_in, 4.5);
    assert_eq!(reading.solar_generation, 0.5);
    assert_eq!(reading.daily_consumption, 8.0);
    assert_eq!(reading.average_daily_use, 14.2);
    assert!(coordinator.last_success().is_some());
}

#[tokio::test]
async fn csv_average_fills_in_when_usage_chart_is_empty() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_export(&server).await;
    mount_page(&server, "/usage", "<p>hello</p>").await;

    let outcome = coordinator_for(&server).refresh_on(today()).await;

    assert_eq!(outcome.tier(), Tier::Csv);
    // Consumption totals 10.0 and 8.0 over the two days in the export.
    assert_eq!(outcome.reading().average_daily_use, 9.0);
}

// ============================================================================
// Tier 2: page scraping
// ============================================================================

#[tokio::test]
async fn missing_export_degrades_to_scraping() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_page(&server, "/usage", USAGE_PAGE).await;

    let outcome = coordinator_for(&server).refresh_on(today()).await;

    let CycleOutcome::Degraded {
        reading,
        missing,
        reason,
    } = outcome
    else {
        panic!("Expected Degraded, got: {:?}", outcome);
    };
    assert_eq!(reading.current_rate, 0.285);
    assert_eq!(reading.average_daily_use, 14.2);
    assert_eq!(reading.solar_generation, 0.0);
    assert_eq!(reading.daily_consumption, 0.0);
    assert_eq!(reading.daily_feed_in, 0.0);
    assert_eq!(
        missing,
        vec![
            ReadingField::SolarGeneration,
            ReadingField::DailyConsumption,
            ReadingField::DailyFeedIn
        ]
    );
    assert!(reason.contains("export"), "reason was: {}", reason);
}

#[tokio::test]
async fn degraded_reading_marks_fallback_rate_as_missing() {
    let server = MockServer::start().await;
    mount_page(&server, "/login", LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/dashboard"))
        .mount(&server)
        .await;
    mount_page(&server, "/", "<html><h1>Dashboard</h1></html>").await;

    let outcome = coordinator_for(&server).refresh_on(today()).await;

    assert_eq!(outcome.tier(), Tier::Scrape);
    assert_eq!(outcome.reading().current_rate, 0.25);
    assert!(outcome.missing().contains(&ReadingField::CurrentRate));
    assert!(outcome.missing().contains(&ReadingField::AverageDailyUse));
}

// ============================================================================
// Tier 3: defaults
// ============================================================================

#[tokio::test]
async fn unreachable_portal_yields_defaults() {
    let server = MockServer::start().await;

    let coordinator = coordinator_for(&server);
    let outcome = coordinator.refresh_on(today()).await;

    let CycleOutcome::Fallback { reading, .. } = &outcome else {
        panic!("Expected Fallback, got: {:?}", outcome);
    };
    assert_eq!(reading.current_rate, 0.25);
    assert_eq!(reading.next_rate, 0.25);
    for (field, value) in reading.fields() {
        assert!(value.is_finite(), "{} not finite", field);
    }
    assert!(coordinator.last_success().is_none());
    assert_eq!(coordinator.last_outcome(), Some(outcome));
}

#[tokio::test]
async fn rejected_credentials_fall_back_but_setup_reports_them() {
    let server = MockServer::start().await;
    mount_page(&server, "/login", LOGIN_PAGE).await;
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Invalid email or password"))
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    assert_eq!(coordinator.refresh_on(today()).await.tier(), Tier::Defaults);

    let err = coordinator.validate_credentials().await.unwrap_err();
    assert!(err.is_credential_problem(), "unexpected error: {}", err);
}

#[tokio::test]
async fn forbidden_portal_caps_logins_per_cycle() {
    let server = MockServer::start().await;
    mount_page(&server, "/login", LOGIN_PAGE).await;
    // Two cycles, each with one login and three re-logins.
    Mock::given(method("POST"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/dashboard"))
        .expect(8)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .with_priority(10)
        .mount(&server)
        .await;

    let coordinator = coordinator_for(&server);
    for _ in 0..2 {
        let outcome = coordinator.refresh_on(today()).await;
        assert_eq!(outcome.tier(), Tier::Defaults, "got: {:?}", outcome);
    }
    assert!(coordinator.last_success().is_none());
}

// ============================================================================
// Coordinator lifecycle and diagnostics
// ============================================================================

#[tokio::test]
async fn stopped_coordinator_publishes_defaults() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_export(&server).await;

    let coordinator = coordinator_for(&server);
    coordinator.stop().await;
    assert_eq!(coordinator.refresh_on(today()).await.tier(), Tier::Defaults);

    coordinator.reset_session().await.unwrap();
    assert_eq!(coordinator.refresh_on(today()).await.tier(), Tier::Csv);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown_and_closes_session() {
    let server = MockServer::start().await;
    let coordinator = coordinator_for(&server);

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let mut tx = Some(tx);
    let mut cycles = 0;
    coordinator
        .run(
            |outcome| {
                cycles += 1;
                assert_eq!(outcome.tier(), Tier::Defaults);
                if let Some(tx) = tx.take() {
                    let _ = tx.send(());
                }
            },
            async {
                let _ = rx.await;
            },
        )
        .await;

    assert_eq!(cycles, 1);
    assert!(coordinator.diagnostics(false).await.session_closed);
}

#[tokio::test]
async fn diagnostics_are_redacted() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_export(&server).await;

    let coordinator = coordinator_for(&server);
    coordinator.refresh_on(today()).await;
    let snapshot = coordinator.diagnostics(false).await;

    assert_eq!(snapshot.username, "us***@example.com");
    assert!(snapshot.logged_in);
    assert_eq!(snapshot.last_tier, Some(Tier::Csv));
    assert!(snapshot.self_test.is_none());

    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(!json.contains("s3cret"));
    assert!(!json.contains("tok123"));
}

#[tokio::test]
async fn self_test_walks_every_step() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    mount_export(&server).await;
    mount_page(&server, "/usage", USAGE_PAGE).await;
    mount_page(&server, "/feed_in_report", FEED_IN_PAGE).await;

    let snapshot = coordinator_for(&server).diagnostics(true).await;
    let report = snapshot.self_test.unwrap();

    assert!(report.endpoint_discovery);
    assert!(report.authentication);
    assert!(report.dashboard_access);
    assert!(report.usage_data);
    assert!(report.solar_data);
    assert!(report.csv_download);
    assert_eq!(report.data_endpoints, vec!["/api/usage/daily"]);
}

#[tokio::test]
async fn self_test_skips_export_without_feed_in_page() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    Mock::given(method("GET"))
        .and(path("/feed_in_report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string(export_body()))
        .expect(0)
        .mount(&server)
        .await;

    let report = coordinator_for(&server).diagnostics(true).await.self_test.unwrap();

    assert!(report.authentication);
    assert!(!report.solar_data);
    assert!(!report.csv_download);
}
