//! Core domain model for the Garmin → Notion health sync.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "hsync-core";

/// Conventional name of the date column in every container.
pub const DATE_COLUMN: &str = "Date";

/// Fallback title column name when a container reports no title-typed column.
pub const FALLBACK_TITLE_COLUMN: &str = "Name";

/// Metric family synced into its own destination container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricFamily {
    Steps,
    Sleep,
    Health,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 3] = [MetricFamily::Steps, MetricFamily::Sleep, MetricFamily::Health];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::Steps => "steps",
            MetricFamily::Sleep => "sleep",
            MetricFamily::Health => "health",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "steps" | "daily-steps" => Some(MetricFamily::Steps),
            "sleep" => Some(MetricFamily::Sleep),
            "health" | "health-metrics" => Some(MetricFamily::Health),
            _ => None,
        }
    }

    /// Logical metrics this family writes, in emission order.
    pub fn metrics(&self) -> &'static [MetricKey] {
        match self {
            MetricFamily::Steps => &[
                MetricKey::TotalSteps,
                MetricKey::StepGoal,
                MetricKey::TotalDistanceKm,
            ],
            MetricFamily::Sleep => &[
                MetricKey::SleepScore,
                MetricKey::SleepEfficiency,
                MetricKey::SleepTotalMinutes,
                MetricKey::DeepMinutes,
                MetricKey::RemMinutes,
                MetricKey::LightMinutes,
                MetricKey::AwakeMinutes,
                MetricKey::Bedtime,
                MetricKey::WakeTime,
                MetricKey::HrvAverage,
            ],
            MetricFamily::Health => &[
                MetricKey::RestingHeartRate,
                MetricKey::AverageStress,
                MetricKey::BodyBatteryHigh,
                MetricKey::BodyBatteryLow,
                MetricKey::HrvAverage,
            ],
        }
    }

    /// Title written on record creation.
    pub fn title_for(&self, date: NaiveDate) -> String {
        match self {
            MetricFamily::Steps => "Walking".to_string(),
            MetricFamily::Sleep => format!("Sleep {}", date.format("%Y-%m-%d")),
            MetricFamily::Health => format!("Health {}", date.format("%Y-%m-%d")),
        }
    }

    /// Title value that distinguishes this family's records when the container
    /// holds several record kinds.
    pub fn discriminator(&self) -> Option<&'static str> {
        match self {
            MetricFamily::Steps => Some("Walking"),
            MetricFamily::Sleep | MetricFamily::Health => None,
        }
    }

    pub fn icon(&self) -> Option<&'static str> {
        match self {
            MetricFamily::Steps => Some("👟"),
            MetricFamily::Sleep => Some("😴"),
            MetricFamily::Health => Some("❤️"),
        }
    }

    /// Columns requested when schema provisioning is enabled.
    pub fn standard_columns(&self) -> Vec<ColumnSpec> {
        let mut columns = vec![ColumnSpec {
            name: DATE_COLUMN.to_string(),
            column_type: ColumnType::Date,
        }];
        columns.extend(self.metrics().iter().map(|metric| ColumnSpec {
            name: metric.column_name().to_string(),
            column_type: metric.column_type(),
        }));
        columns
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed catalog of logical metrics the sync knows how to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    TotalSteps,
    StepGoal,
    TotalDistanceKm,
    SleepScore,
    SleepEfficiency,
    SleepTotalMinutes,
    DeepMinutes,
    RemMinutes,
    LightMinutes,
    AwakeMinutes,
    Bedtime,
    WakeTime,
    HrvAverage,
    RestingHeartRate,
    AverageStress,
    BodyBatteryHigh,
    BodyBatteryLow,
}

impl MetricKey {
    pub const ALL: [MetricKey; 17] = [
        MetricKey::TotalSteps,
        MetricKey::StepGoal,
        MetricKey::TotalDistanceKm,
        MetricKey::SleepScore,
        MetricKey::SleepEfficiency,
        MetricKey::SleepTotalMinutes,
        MetricKey::DeepMinutes,
        MetricKey::RemMinutes,
        MetricKey::LightMinutes,
        MetricKey::AwakeMinutes,
        MetricKey::Bedtime,
        MetricKey::WakeTime,
        MetricKey::HrvAverage,
        MetricKey::RestingHeartRate,
        MetricKey::AverageStress,
        MetricKey::BodyBatteryHigh,
        MetricKey::BodyBatteryLow,
    ];

    /// Conventional destination column name.
    pub fn column_name(&self) -> &'static str {
        match self {
            MetricKey::TotalSteps => "Total Steps",
            MetricKey::StepGoal => "Step Goal",
            MetricKey::TotalDistanceKm => "Total Distance (km)",
            MetricKey::SleepScore => "Score",
            MetricKey::SleepEfficiency => "Efficiency (%)",
            MetricKey::SleepTotalMinutes => "Total (min)",
            MetricKey::DeepMinutes => "Deep (min)",
            MetricKey::RemMinutes => "REM (min)",
            MetricKey::LightMinutes => "Light (min)",
            MetricKey::AwakeMinutes => "Awake (min)",
            MetricKey::Bedtime => "Bedtime",
            MetricKey::WakeTime => "Wake time",
            MetricKey::HrvAverage => "HRV (ms)",
            MetricKey::RestingHeartRate => "Resting HR (bpm)",
            MetricKey::AverageStress => "Avg Stress",
            MetricKey::BodyBatteryHigh => "Body Battery High",
            MetricKey::BodyBatteryLow => "Body Battery Low",
        }
    }

    /// Declared column type a destination column must have to be usable.
    pub fn column_type(&self) -> ColumnType {
        match self {
            MetricKey::Bedtime | MetricKey::WakeTime => ColumnType::Date,
            _ => ColumnType::Number,
        }
    }
}

/// Destination column type as declared by the container schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Title,
    RichText,
    Number,
    Date,
    Select,
    Other(String),
}

impl ColumnType {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "title" => ColumnType::Title,
            "rich_text" => ColumnType::RichText,
            "number" => ColumnType::Number,
            "date" => ColumnType::Date,
            "select" => ColumnType::Select,
            other => ColumnType::Other(other.to_string()),
        }
    }

    pub fn as_api_str(&self) -> &str {
        match self {
            ColumnType::Title => "title",
            ColumnType::RichText => "rich_text",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Select => "select",
            ColumnType::Other(kind) => kind.as_str(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Column name + type pair used for schema provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub id: String,
    pub column_type: ColumnType,
}

/// Object that record writes and queries are addressed to.
///
/// Newer Notion API versions split a database (container) into one or more
/// data sources; older versions address the database directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum WriteTarget {
    Database(String),
    DataSource(String),
}

impl WriteTarget {
    pub fn id(&self) -> &str {
        match self {
            WriteTarget::Database(id) | WriteTarget::DataSource(id) => id,
        }
    }
}

/// Raw column catalog of a container as reported by the destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerCatalog {
    pub container_id: String,
    pub title: Option<String>,
    pub target: WriteTarget,
    pub columns: Vec<ColumnDef>,
}

impl ContainerCatalog {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Resolved column roles for one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationSchema {
    pub container_id: String,
    pub target: WriteTarget,
    pub title_column: String,
    pub date_column: String,
    /// Capability set: metrics whose column exists with the expected type.
    pub metrics: BTreeMap<MetricKey, String>,
}

impl DestinationSchema {
    pub fn column_for(&self, metric: MetricKey) -> Option<&str> {
        self.metrics.get(&metric).map(String::as_str)
    }

    pub fn supports(&self, metric: MetricKey) -> bool {
        self.metrics.contains_key(&metric)
    }
}

/// Stored or candidate value of a single destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Number(f64),
    /// Plain text of the title column.
    Title(String),
    /// Plain text of a rich-text or select column.
    Text(String),
    /// Date or timestamp in its normalized string form.
    Date(String),
    Empty,
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Title(s) | PropertyValue::Text(s) | PropertyValue::Date(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PropertyValue::Empty)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Title(s) | PropertyValue::Text(s) | PropertyValue::Date(s) => {
                f.write_str(s)
            }
            PropertyValue::Empty => f.write_str("<empty>"),
        }
    }
}

/// Set of destination-column writes keyed by physical column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnWriteSet {
    columns: BTreeMap<String, PropertyValue>,
}

impl ColumnWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: PropertyValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&PropertyValue> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.columns.iter()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }

    /// Adds every write of `other`, overriding columns already present.
    pub fn extend(&mut self, other: ColumnWriteSet) {
        self.columns.extend(other.columns);
    }
}

impl FromIterator<(String, PropertyValue)> for ColumnWriteSet {
    fn from_iter<I: IntoIterator<Item = (String, PropertyValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// One day of source metrics for a single family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetricRecord {
    pub family: MetricFamily,
    pub date: NaiveDate,
    /// Raw source documents; shape varies across source releases.
    pub payload: JsonValue,
}

/// Existing destination record for a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationRecord {
    pub id: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Equality predicate on a typed column; a query is their conjunction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub column: String,
    pub column_type: ColumnType,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncOutcome::Created => "Created",
            SyncOutcome::Updated => "Updated",
            SyncOutcome::Unchanged => "Unchanged",
        };
        f.write_str(label)
    }
}

const UTC_SECONDS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Normalizes a source or destination timestamp to `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Zone-qualified inputs are converted to UTC; naive inputs are taken as UTC.
/// Sub-second precision is dropped. Plain dates are returned unchanged.
pub fn normalize_timestamp(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc).format(UTC_SECONDS_FORMAT).to_string());
    }
    let naive = trimmed.trim_end_matches(['Z', 'z']);
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, pattern) {
            return Some(parsed.and_utc().format(UTC_SECONDS_FORMAT).to_string());
        }
    }
    None
}

/// Formats epoch milliseconds as a normalized UTC timestamp.
pub fn timestamp_from_epoch_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format(UTC_SECONDS_FORMAT).to_string())
}
