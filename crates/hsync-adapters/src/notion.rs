//! Notion destination adapter.
//!
//! API versions from `2025-09-03` split each database into data sources; the
//! schema lives on the data source and pages are created under it. Older pins
//! address the database directly.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use hsync_core::{
    normalize_timestamp, ColumnDef, ColumnSpec, ColumnType, ColumnWriteSet, ContainerCatalog,
    DestinationRecord, FilterPredicate, PropertyValue, WriteTarget,
};
use hsync_storage::{HttpClientConfig, JsonHttp};
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info};

use crate::{DestinationAdapter, DestinationError};

pub const DEFAULT_NOTION_VERSION: &str = "2025-09-03";
pub const NOTION_API_BASE: &str = "https://api.notion.com";

/// First version that exposes data sources.
const DATA_SOURCES_VERSION: &str = "2025-09-03";

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub version: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NotionConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            version: DEFAULT_NOTION_VERSION.to_string(),
            base_url: NOTION_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Version pins are ISO dates, so lexical order is chronological.
    pub fn uses_data_sources(&self) -> bool {
        self.version.as_str() >= DATA_SOURCES_VERSION
    }
}

pub struct NotionDestination {
    http: JsonHttp,
    data_sources: bool,
}

impl NotionDestination {
    pub fn new(config: NotionConfig) -> Result<Self, DestinationError> {
        let data_sources = config.uses_data_sources();
        let http = JsonHttp::new(HttpClientConfig {
            base_url: config.base_url,
            timeout: config.timeout,
            user_agent: Some(format!("hsync/{}", env!("CARGO_PKG_VERSION"))),
            bearer_token: Some(config.token),
            headers: vec![("Notion-Version".to_string(), config.version)],
        })
        .map_err(DestinationError::Transport)?;
        Ok(Self { http, data_sources })
    }

    fn target_path(target: &WriteTarget) -> String {
        match target {
            WriteTarget::Database(id) => format!("/v1/databases/{id}"),
            WriteTarget::DataSource(id) => format!("/v1/data_sources/{id}"),
        }
    }
}

#[async_trait]
impl DestinationAdapter for NotionDestination {
    async fn retrieve_schema(&self, container_id: &str) -> Result<ContainerCatalog, DestinationError> {
        let database = self.http.get(&format!("/v1/databases/{container_id}")).await?;
        let title = plain_text(database.get("title"));

        if !self.data_sources {
            return Ok(ContainerCatalog {
                container_id: container_id.to_string(),
                title,
                target: WriteTarget::Database(container_id.to_string()),
                columns: decode_columns(database.get("properties"))?,
            });
        }

        let data_source_id = database
            .get("data_sources")
            .and_then(|v| v.as_array())
            .and_then(|sources| sources.first())
            .and_then(|source| source.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| DestinationError::NoDataSource {
                container_id: container_id.to_string(),
            })?
            .to_string();
        debug!(container = %container_id, data_source = %data_source_id, "resolved data source");

        let data_source = self
            .http
            .get(&format!("/v1/data_sources/{data_source_id}"))
            .await?;
        Ok(ContainerCatalog {
            container_id: container_id.to_string(),
            title,
            target: WriteTarget::DataSource(data_source_id),
            columns: decode_columns(data_source.get("properties"))?,
        })
    }

    async fn query(
        &self,
        target: &WriteTarget,
        filter: &[FilterPredicate],
    ) -> Result<Vec<DestinationRecord>, DestinationError> {
        let body = json!({
            "filter": { "and": filter.iter().map(encode_filter).collect::<Vec<_>>() },
            "page_size": 2,
        });
        let response = self
            .http
            .post(&format!("{}/query", Self::target_path(target)), &body)
            .await?;
        response
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DestinationError::Malformed("query response has no results".to_string()))?
            .iter()
            .map(decode_page)
            .collect()
    }

    async fn create(
        &self,
        target: &WriteTarget,
        properties: &ColumnWriteSet,
        icon: Option<&str>,
    ) -> Result<String, DestinationError> {
        let parent = match target {
            WriteTarget::Database(id) => json!({ "type": "database_id", "database_id": id }),
            WriteTarget::DataSource(id) => json!({ "type": "data_source_id", "data_source_id": id }),
        };
        let mut body = json!({
            "parent": parent,
            "properties": encode_properties(properties),
        });
        if let Some(emoji) = icon {
            body["icon"] = json!({ "type": "emoji", "emoji": emoji });
        }
        let page = self.http.post("/v1/pages", &body).await?;
        page.get("id")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| DestinationError::Malformed("created page has no id".to_string()))
    }

    async fn update(&self, record_id: &str, properties: &ColumnWriteSet) -> Result<(), DestinationError> {
        self.http
            .patch(
                &format!("/v1/pages/{record_id}"),
                &json!({ "properties": encode_properties(properties) }),
            )
            .await?;
        Ok(())
    }

    async fn add_columns(&self, target: &WriteTarget, columns: &[ColumnSpec]) -> Result<(), DestinationError> {
        if columns.is_empty() {
            return Ok(());
        }
        let properties: Map<String, JsonValue> = columns
            .iter()
            .map(|column| {
                let mut definition = Map::new();
                definition.insert(column.column_type.as_api_str().to_string(), json!({}));
                (column.name.clone(), JsonValue::Object(definition))
            })
            .collect();
        self.http
            .patch(&Self::target_path(target), &json!({ "properties": properties }))
            .await?;
        info!(target = %target.id(), added = columns.len(), "requested missing columns");
        Ok(())
    }
}

fn decode_columns(properties: Option<&JsonValue>) -> Result<Vec<ColumnDef>, DestinationError> {
    let properties = properties
        .and_then(|v| v.as_object())
        .ok_or_else(|| DestinationError::Malformed("schema response has no properties".to_string()))?;
    Ok(properties
        .iter()
        .map(|(name, definition)| ColumnDef {
            name: name.clone(),
            id: definition
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            column_type: ColumnType::from_api(
                definition.get("type").and_then(|v| v.as_str()).unwrap_or_default(),
            ),
        })
        .collect())
}

/// Concatenated `plain_text` of a rich-text array; `None` when blank.
fn plain_text(value: Option<&JsonValue>) -> Option<String> {
    let text: String = value?
        .as_array()?
        .iter()
        .filter_map(|span| {
            span.get("plain_text")
                .or_else(|| span.pointer("/text/content"))
                .and_then(|v| v.as_str())
        })
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Stored value of one page property. Unsupported property kinds yield `None`.
pub fn decode_property(property: &JsonValue) -> Option<PropertyValue> {
    let kind = property.get("type")?.as_str()?;
    let value = property.get(kind);
    let decoded = match kind {
        "number" => value
            .and_then(|v| v.as_f64())
            .map(PropertyValue::Number)
            .unwrap_or(PropertyValue::Empty),
        "title" => plain_text(value).map(PropertyValue::Title).unwrap_or(PropertyValue::Empty),
        "rich_text" => plain_text(value).map(PropertyValue::Text).unwrap_or(PropertyValue::Empty),
        "select" => value
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
            .map(|name| PropertyValue::Text(name.to_string()))
            .unwrap_or(PropertyValue::Empty),
        "date" => value
            .and_then(|v| v.get("start"))
            .and_then(|v| v.as_str())
            .and_then(normalize_timestamp)
            .map(PropertyValue::Date)
            .unwrap_or(PropertyValue::Empty),
        _ => return None,
    };
    Some(decoded)
}

fn decode_page(page: &JsonValue) -> Result<DestinationRecord, DestinationError> {
    let id = page
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DestinationError::Malformed("page has no id".to_string()))?
        .to_string();
    let properties: BTreeMap<String, PropertyValue> = page
        .get("properties")
        .and_then(|v| v.as_object())
        .map(|props| {
            props
                .iter()
                .filter_map(|(name, property)| decode_property(property).map(|value| (name.clone(), value)))
                .collect()
        })
        .unwrap_or_default();
    Ok(DestinationRecord { id, properties })
}

/// Property payload for a write; empty values are not sent.
pub fn encode_property(value: &PropertyValue) -> Option<JsonValue> {
    match value {
        PropertyValue::Number(n) => Some(json!({ "number": n })),
        PropertyValue::Title(text) => Some(json!({ "title": [{ "text": { "content": text } }] })),
        PropertyValue::Text(text) => Some(json!({ "rich_text": [{ "text": { "content": text } }] })),
        PropertyValue::Date(start) => Some(json!({ "date": { "start": start } })),
        PropertyValue::Empty => None,
    }
}

fn encode_properties(properties: &ColumnWriteSet) -> JsonValue {
    let encoded: Map<String, JsonValue> = properties
        .iter()
        .filter_map(|(name, value)| encode_property(value).map(|v| (name.clone(), v)))
        .collect();
    JsonValue::Object(encoded)
}

pub fn encode_filter(predicate: &FilterPredicate) -> JsonValue {
    let operand = match &predicate.value {
        PropertyValue::Number(n) => json!(n),
        PropertyValue::Title(s) | PropertyValue::Text(s) | PropertyValue::Date(s) => json!(s),
        PropertyValue::Empty => JsonValue::Null,
    };
    let condition = if predicate.value.is_empty() {
        json!({ "is_empty": true })
    } else {
        json!({ "equals": operand })
    };
    let mut filter = Map::new();
    filter.insert("property".to_string(), json!(predicate.column));
    filter.insert(predicate.column_type.as_api_str().to_string(), condition);
    JsonValue::Object(filter)
}
