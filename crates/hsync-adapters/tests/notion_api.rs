//! Notion destination adapter against a mocked API.

use std::time::Duration;

use hsync_adapters::{DestinationAdapter, DestinationError, NotionConfig, NotionDestination};
use hsync_core::{ColumnSpec, ColumnType, ColumnWriteSet, FilterPredicate, PropertyValue, WriteTarget};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, version: &str) -> NotionConfig {
    NotionConfig {
        token: "secret_test".to_string(),
        version: version.to_string(),
        base_url: server.uri(),
        timeout: Duration::from_secs(5),
    }
}

fn destination(server: &MockServer) -> NotionDestination {
    NotionDestination::new(config(server, "2025-09-03")).unwrap()
}

#[tokio::test]
async fn schema_is_read_from_the_first_data_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/db-steps"))
        .and(header("Notion-Version", "2025-09-03"))
        .and(header("Authorization", "Bearer secret_test"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/notion_database_2025.json")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/data_sources/ds-steps"))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/notion_data_source.json")))
        .mount(&server)
        .await;

    let catalog = destination(&server).retrieve_schema("db-steps").await.unwrap();

    assert_eq!(catalog.title.as_deref(), Some("Daily Steps"));
    assert_eq!(catalog.target, WriteTarget::DataSource("ds-steps".into()));
    assert_eq!(catalog.column("Name").unwrap().column_type, ColumnType::Title);
    assert_eq!(catalog.column("Total Steps").unwrap().column_type, ColumnType::Number);
    assert_eq!(catalog.column("Notes").unwrap().column_type, ColumnType::RichText);
}

#[tokio::test]
async fn database_without_data_sources_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/linked-view"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"object": "database", "id": "linked-view", "data_sources": []})),
        )
        .mount(&server)
        .await;

    let err = destination(&server).retrieve_schema("linked-view").await.unwrap_err();
    assert!(matches!(err, DestinationError::NoDataSource { .. }));
}

#[tokio::test]
async fn legacy_versions_read_database_properties_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/db-old"))
        .and(header("Notion-Version", "2022-06-28"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "database",
            "id": "db-old",
            "title": [],
            "properties": {
                "Name": {"id": "title", "type": "title", "title": {}},
                "Date": {"id": "x", "type": "date", "date": {}}
            }
        })))
        .mount(&server)
        .await;

    let dest = NotionDestination::new(config(&server, "2022-06-28")).unwrap();
    let catalog = dest.retrieve_schema("db-old").await.unwrap();
    assert_eq!(catalog.target, WriteTarget::Database("db-old".into()));
    assert_eq!(catalog.title, None);
    assert_eq!(catalog.columns.len(), 2);
}

#[tokio::test]
async fn missing_database_surfaces_api_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/databases/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "object": "error",
            "status": 404,
            "code": "object_not_found",
            "message": "Could not find database with ID: nope."
        })))
        .mount(&server)
        .await;

    match destination(&server).retrieve_schema("nope").await {
        Err(DestinationError::Api { status, code, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(code, "object_not_found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn query_sends_conjunction_filter_and_decodes_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/data_sources/ds-steps/query"))
        .and(body_json(json!({
            "filter": {"and": [
                {"property": "Date", "date": {"equals": "2024-03-01"}},
                {"property": "Name", "title": {"equals": "Walking"}}
            ]},
            "page_size": 2
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(include_str!("fixtures/notion_query_results.json")))
        .mount(&server)
        .await;

    let records = destination(&server)
        .query(
            &WriteTarget::DataSource("ds-steps".into()),
            &[
                FilterPredicate {
                    column: "Date".into(),
                    column_type: ColumnType::Date,
                    value: PropertyValue::Date("2024-03-01".into()),
                },
                FilterPredicate {
                    column: "Name".into(),
                    column_type: ColumnType::Title,
                    value: PropertyValue::Title("Walking".into()),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, "page-1");
    assert_eq!(record.properties["Total Steps"], PropertyValue::Number(8000.0));
    assert_eq!(record.properties["Step Goal"], PropertyValue::Empty);
    assert_eq!(record.properties["Notes"], PropertyValue::Empty);
    assert_eq!(record.properties["Date"], PropertyValue::Date("2024-03-01".into()));
    assert_eq!(record.properties["Name"], PropertyValue::Title("Walking".into()));
}

#[tokio::test]
async fn create_targets_the_data_source_with_an_emoji_icon() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/pages"))
        .and(body_json(json!({
            "parent": {"type": "data_source_id", "data_source_id": "ds-steps"},
            "properties": {
                "Date": {"date": {"start": "2024-03-01"}},
                "Name": {"title": [{"text": {"content": "Walking"}}]},
                "Total Steps": {"number": 8000.0}
            },
            "icon": {"type": "emoji", "emoji": "👟"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "new-page"})))
        .mount(&server)
        .await;

    let mut properties = ColumnWriteSet::new();
    properties.insert("Name", PropertyValue::Title("Walking".into()));
    properties.insert("Date", PropertyValue::Date("2024-03-01".into()));
    properties.insert("Total Steps", PropertyValue::Number(8000.0));

    let id = destination(&server)
        .create(&WriteTarget::DataSource("ds-steps".into()), &properties, Some("👟"))
        .await
        .unwrap();
    assert_eq!(id, "new-page");
}

#[tokio::test]
async fn update_patches_only_the_given_properties() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/pages/page-1"))
        .and(body_json(json!({"properties": {"Total Steps": {"number": 8200.0}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "page", "id": "page-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut properties = ColumnWriteSet::new();
    properties.insert("Total Steps", PropertyValue::Number(8200.0));
    destination(&server).update("page-1", &properties).await.unwrap();
}

#[tokio::test]
async fn add_columns_patches_the_data_source_schema() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v1/data_sources/ds-sleep"))
        .and(body_json(json!({"properties": {
            "Bedtime": {"date": {}},
            "Score": {"number": {}}
        }})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"object": "data_source", "id": "ds-sleep"})))
        .expect(1)
        .mount(&server)
        .await;

    destination(&server)
        .add_columns(
            &WriteTarget::DataSource("ds-sleep".into()),
            &[
                ColumnSpec {
                    name: "Score".into(),
                    column_type: ColumnType::Number,
                },
                ColumnSpec {
                    name: "Bedtime".into(),
                    column_type: ColumnType::Date,
                },
            ],
        )
        .await
        .unwrap();
}
