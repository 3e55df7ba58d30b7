//! Garmin source adapter against a mocked Connect API.

use chrono::NaiveDate;
use hsync_adapters::{GarminConfig, GarminSource, OAuth2Token, SourceAdapter, SourceError};
use hsync_core::MetricFamily;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_token() -> OAuth2Token {
    OAuth2Token {
        token_type: "Bearer".to_string(),
        access_token: "test-access-token".to_string(),
        refresh_token: Some("test-refresh-token".to_string()),
        expires_at: chrono::Utc::now().timestamp() + 3600,
    }
}

fn test_source(server: &MockServer) -> GarminSource {
    GarminSource::with_base_url(GarminConfig::new(test_token()), &server.uri()).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

async fn mount_profile(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .and(header("Authorization", "Bearer test-access-token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"displayName": "runner", "id": 1})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn login_reads_display_name() {
    let server = MockServer::start().await;
    mount_profile(&server).await;

    let session = test_source(&server).login().await.unwrap();
    assert_eq!(session.display_name.as_deref(), Some("runner"));
}

#[tokio::test]
async fn login_with_rejected_token_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/userprofile-service/socialProfile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = test_source(&server).login().await.unwrap_err();
    assert!(matches!(err, SourceError::Auth(_)));
}

#[tokio::test]
async fn expired_token_fails_before_any_request() {
    let server = MockServer::start().await;
    let mut token = test_token();
    token.expires_at = 1;
    let source = GarminSource::with_base_url(GarminConfig::new(token), &server.uri()).unwrap();

    assert!(matches!(source.login().await, Err(SourceError::Auth(_))));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn steps_pick_the_entry_for_the_requested_day() {
    let server = MockServer::start().await;
    mount_profile(&server).await;
    Mock::given(method("GET"))
        .and(path("/usersummary-service/stats/steps/daily/2024-03-01/2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/steps_2024-03-01.json")))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let session = source.login().await.unwrap();
    let record = source
        .fetch_metrics(&session, MetricFamily::Steps, day())
        .await
        .unwrap();

    assert_eq!(record.family, MetricFamily::Steps);
    assert_eq!(record.payload["calendarDate"], "2024-03-01");
    assert_eq!(record.payload["totalSteps"], 8000);
}

#[tokio::test]
async fn steps_without_an_entry_for_the_day_is_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/usersummary-service/stats/steps/daily/2024-03-01/2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let session = hsync_adapters::SourceSession::anonymous();
    let err = source
        .fetch_metrics(&session, MetricFamily::Steps, day())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::NoData { family: MetricFamily::Steps, .. }));
}

#[tokio::test]
async fn sleep_combines_sleep_and_hrv_documents() {
    let server = MockServer::start().await;
    mount_profile(&server).await;
    Mock::given(method("GET"))
        .and(path("/wellness-service/wellness/dailySleepData/runner"))
        .and(query_param("date", "2024-03-01"))
        .and(query_param("nonSleepBufferMinutes", "60"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/sleep_2024-03-01.json")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hrv-service/hrv/2024-03-01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/hrv_2024-03-01.json")))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let session = source.login().await.unwrap();
    let record = source
        .fetch_metrics(&session, MetricFamily::Sleep, day())
        .await
        .unwrap();

    assert_eq!(record.payload["sleep"]["dailySleepDTO"]["sleepTimeSeconds"], 26100);
    assert_eq!(record.payload["hrv"]["hrvSummary"]["lastNightAvg"], 48.256);
}

#[tokio::test]
async fn missing_hrv_does_not_fail_the_health_fetch() {
    let server = MockServer::start().await;
    mount_profile(&server).await;
    Mock::given(method("GET"))
        .and(path("/usersummary-service/usersummary/daily/runner"))
        .and(query_param("calendarDate", "2024-03-01"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(include_str!("fixtures/usersummary_2024-03-01.json")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hrv-service/hrv/2024-03-01"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let source = test_source(&server);
    let session = source.login().await.unwrap();
    let record = source
        .fetch_metrics(&session, MetricFamily::Health, day())
        .await
        .unwrap();

    assert_eq!(record.payload["summary"]["restingHeartRate"], 52);
    assert_eq!(record.payload["hrv"], serde_json::json!({}));
}

#[tokio::test]
async fn sleep_without_a_session_display_name_is_rejected() {
    let server = MockServer::start().await;
    let source = test_source(&server);
    let err = source
        .fetch_metrics(&hsync_adapters::SourceSession::anonymous(), MetricFamily::Sleep, day())
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::Auth(_)));
}
