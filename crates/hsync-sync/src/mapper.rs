//! Source payload → destination column writes.
//!
//! Every metric declares a root and an ordered list of candidate paths; the
//! first candidate holding a usable value wins. Structural mismatches mean
//! the value is absent, never an error.

use hsync_core::{
    normalize_timestamp, timestamp_from_epoch_millis, ColumnWriteSet, DailyMetricRecord, DestinationSchema,
    MetricFamily, MetricKey, PropertyValue,
};
use serde_json::Value as JsonValue;
use tracing::debug;

/// How a raw source value becomes a column value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Count,
    MetresToKm,
    SecondsToMinutes,
    Timestamp,
    /// Rounded to 2 dp; negative sentinels are absent.
    Hrv,
    /// Negative sentinels are absent.
    NonNegative,
}

struct MetricPaths {
    root: &'static str,
    candidates: &'static [&'static str],
    conversion: Conversion,
}

const HRV_CANDIDATES: &[&str] = &[
    "hrvSummary.lastNightAvg",
    "hrvSummary.avg",
    "hrvSummary.average",
    "lastNightAvg",
    "avg",
    "hrvValue",
    "average",
];

const SLEEP_ROOT: &str = "sleep.dailySleepDTO";

const fn paths(root: &'static str, candidates: &'static [&'static str], conversion: Conversion) -> MetricPaths {
    MetricPaths {
        root,
        candidates,
        conversion,
    }
}

fn metric_paths(metric: MetricKey) -> MetricPaths {
    use Conversion::*;
    match metric {
        MetricKey::TotalSteps => paths("", &["totalSteps"], Count),
        MetricKey::StepGoal => paths("", &["stepGoal"], Count),
        MetricKey::TotalDistanceKm => paths("", &["totalDistance"], MetresToKm),
        MetricKey::SleepScore => paths(SLEEP_ROOT, &["sleepScore", "sleepScores.overall.value"], Count),
        MetricKey::SleepEfficiency => paths(SLEEP_ROOT, &["sleepEfficiency"], Count),
        MetricKey::SleepTotalMinutes => paths(SLEEP_ROOT, &["sleepTimeSeconds", "durationInSeconds"], SecondsToMinutes),
        MetricKey::DeepMinutes => paths(SLEEP_ROOT, &["deepSleepSeconds"], SecondsToMinutes),
        MetricKey::RemMinutes => paths(SLEEP_ROOT, &["remSleepSeconds"], SecondsToMinutes),
        MetricKey::LightMinutes => paths(SLEEP_ROOT, &["lightSleepSeconds"], SecondsToMinutes),
        MetricKey::AwakeMinutes => paths(SLEEP_ROOT, &["awakeSleepSeconds"], SecondsToMinutes),
        MetricKey::Bedtime => paths(SLEEP_ROOT, &["sleepStartTimestampGMT", "startTimeGMT"], Timestamp),
        MetricKey::WakeTime => paths(SLEEP_ROOT, &["sleepEndTimestampGMT", "endTimeGMT"], Timestamp),
        MetricKey::HrvAverage => paths("hrv", HRV_CANDIDATES, Hrv),
        MetricKey::RestingHeartRate => paths("summary", &["restingHeartRate"], Count),
        MetricKey::AverageStress => paths("summary", &["averageStressLevel"], NonNegative),
        MetricKey::BodyBatteryHigh => paths("summary", &["bodyBatteryHighestValue"], Count),
        MetricKey::BodyBatteryLow => paths("summary", &["bodyBatteryLowestValue"], Count),
    }
}

/// Dotted path lookup; `null` counts as absent.
fn lookup<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }
    let found = path.split('.').try_fold(value, |node, key| node.get(key))?;
    (!found.is_null()).then_some(found)
}

/// Metres → kilometres, two decimals, ties away from zero.
///
/// Works in whole millimetres so that binary float error cannot move a value
/// across a rounding boundary.
pub fn metres_to_km(metres: f64) -> f64 {
    let millimetres = (metres * 1000.0).round() as i64;
    let hundredths = if millimetres >= 0 {
        (millimetres + 5_000) / 10_000
    } else {
        (millimetres - 5_000) / 10_000
    };
    hundredths as f64 / 100.0
}

/// Seconds → whole minutes, ties away from zero.
pub fn seconds_to_minutes(seconds: f64) -> f64 {
    (seconds / 60.0).round()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn convert(conversion: Conversion, raw: &JsonValue) -> Option<PropertyValue> {
    match conversion {
        Conversion::Timestamp => match raw {
            JsonValue::String(s) => normalize_timestamp(s),
            JsonValue::Number(n) => n.as_i64().and_then(timestamp_from_epoch_millis),
            _ => None,
        }
        .map(PropertyValue::Date),
        Conversion::Count => raw.as_f64().map(PropertyValue::Number),
        Conversion::MetresToKm => raw.as_f64().map(|m| PropertyValue::Number(metres_to_km(m))),
        Conversion::SecondsToMinutes => raw.as_f64().map(|s| PropertyValue::Number(seconds_to_minutes(s))),
        Conversion::Hrv => raw
            .as_f64()
            .filter(|v| *v >= 0.0)
            .map(|v| PropertyValue::Number(round2(v))),
        Conversion::NonNegative => raw.as_f64().filter(|v| *v >= 0.0).map(PropertyValue::Number),
    }
}

/// Value of `metric` in a family payload, if the source supplied one.
pub fn metric_value(metric: MetricKey, payload: &JsonValue) -> Option<PropertyValue> {
    let paths = metric_paths(metric);
    let Some(root) = lookup(payload, paths.root) else {
        if paths.conversion == Conversion::MetresToKm {
            return Some(PropertyValue::Number(0.0));
        }
        return None;
    };
    for candidate in paths.candidates {
        if let Some(raw) = lookup(root, candidate) {
            match convert(paths.conversion, raw) {
                Some(value) => return Some(value),
                None => debug!(?metric, path = %candidate, raw = %raw, "unusable source value"),
            }
        }
    }
    if paths.conversion == Conversion::MetresToKm {
        // Days without movement omit distance entirely.
        return Some(PropertyValue::Number(0.0));
    }
    None
}

/// Column writes for every metric of the record's family that the schema can
/// hold and the source supplied. Title and date are added by the engine.
pub fn map_record(record: &DailyMetricRecord, schema: &DestinationSchema) -> ColumnWriteSet {
    map_payload(record.family, &record.payload, schema)
}

pub fn map_payload(family: MetricFamily, payload: &JsonValue, schema: &DestinationSchema) -> ColumnWriteSet {
    let mut writes = ColumnWriteSet::new();
    for metric in family.metrics() {
        let Some(column) = schema.column_for(*metric) else {
            continue;
        };
        if column == schema.date_column {
            continue;
        }
        if let Some(value) = metric_value(*metric, payload) {
            writes.insert(column, value);
        }
    }
    writes
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsync_core::WriteTarget;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema_with(metrics: &[MetricKey]) -> DestinationSchema {
        DestinationSchema {
            container_id: "db".into(),
            target: WriteTarget::DataSource("ds".into()),
            title_column: "Name".into(),
            date_column: "Date".into(),
            metrics: metrics
                .iter()
                .map(|m| (*m, m.column_name().to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn number(writes: &ColumnWriteSet, column: &str) -> Option<f64> {
        writes.get(column).and_then(PropertyValue::as_f64)
    }

    #[test]
    fn metric_sharing_the_date_column_is_not_written() {
        let mut schema = schema_with(&[MetricKey::WakeTime, MetricKey::SleepTotalMinutes]);
        schema.date_column = "Wake time".into();
        let payload = json!({"sleep": {"dailySleepDTO": {"sleepTimeSeconds": 600, "sleepEndTimestampGMT": 1709361845000_i64}}});
        let writes = map_payload(MetricFamily::Sleep, &payload, &schema);
        assert!(!writes.contains("Wake time"));
        assert_eq!(number(&writes, "Total (min)"), Some(10.0));
    }

    #[test]
    fn distance_rounds_half_up_to_hundredths() {
        assert_eq!(metres_to_km(1234.5), 1.23);
        assert_eq!(metres_to_km(1225.0), 1.23);
        assert_eq!(metres_to_km(1224.9), 1.22);
        assert_eq!(metres_to_km(6234.5), 6.23);
        assert_eq!(metres_to_km(0.0), 0.0);
    }

    #[test]
    fn seconds_round_to_nearest_minute() {
        assert_eq!(seconds_to_minutes(90.0), 2.0);
        assert_eq!(seconds_to_minutes(89.0), 1.0);
        assert_eq!(seconds_to_minutes(26_100.0), 435.0);
    }

    #[test]
    fn steps_payload_maps_counts_and_distance() {
        let schema = schema_with(MetricFamily::Steps.metrics());
        let writes = map_payload(
            MetricFamily::Steps,
            &json!({"calendarDate": "2024-03-01", "totalSteps": 8000, "stepGoal": 10000, "totalDistance": 1225}),
            &schema,
        );
        assert_eq!(number(&writes, "Total Steps"), Some(8000.0));
        assert_eq!(number(&writes, "Step Goal"), Some(10000.0));
        assert_eq!(number(&writes, "Total Distance (km)"), Some(1.23));
    }

    #[test]
    fn missing_distance_is_written_as_zero() {
        let schema = schema_with(&[MetricKey::TotalDistanceKm]);
        let writes = map_payload(MetricFamily::Steps, &json!({"totalSteps": 12}), &schema);
        assert_eq!(number(&writes, "Total Distance (km)"), Some(0.0));
    }

    #[test]
    fn columns_missing_from_the_schema_are_never_written() {
        let payloads = [
            json!({"totalSteps": 8000, "stepGoal": 10000, "totalDistance": 5000}),
            json!({}),
            json!({"totalSteps": null, "stepGoal": "n/a"}),
            json!([1, 2, 3]),
        ];
        let schema = schema_with(&[MetricKey::TotalSteps]);
        for payload in payloads {
            let writes = map_payload(MetricFamily::Steps, &payload, &schema);
            assert!(!writes.contains("Step Goal"));
            assert!(!writes.contains("Total Distance (km)"));
        }
    }

    #[test]
    fn primary_alias_wins_over_fallback() {
        let schema = schema_with(&[MetricKey::SleepTotalMinutes, MetricKey::SleepScore]);
        let payload = json!({"sleep": {"dailySleepDTO": {
            "sleepTimeSeconds": 27000,
            "durationInSeconds": 30000,
            "sleepScore": 71,
            "sleepScores": {"overall": {"value": 82}}
        }}});
        let writes = map_payload(MetricFamily::Sleep, &payload, &schema);
        assert_eq!(number(&writes, "Total (min)"), Some(450.0));
        assert_eq!(number(&writes, "Score"), Some(71.0));

        let fallback = json!({"sleep": {"dailySleepDTO": {
            "durationInSeconds": 30000,
            "sleepScores": {"overall": {"value": 82}}
        }}});
        let writes = map_payload(MetricFamily::Sleep, &fallback, &schema);
        assert_eq!(number(&writes, "Total (min)"), Some(500.0));
        assert_eq!(number(&writes, "Score"), Some(82.0));
    }

    #[test]
    fn sleep_timestamps_accept_epoch_millis_and_strings() {
        let schema = schema_with(&[MetricKey::Bedtime, MetricKey::WakeTime]);
        let payload = json!({"sleep": {"dailySleepDTO": {
            "sleepStartTimestampGMT": 1_709_331_245_000_i64,
            "endTimeGMT": "2024-03-02T06:44:05.0"
        }}});
        let writes = map_payload(MetricFamily::Sleep, &payload, &schema);
        assert_eq!(
            writes.get("Bedtime"),
            Some(&PropertyValue::Date("2024-03-01T22:14:05Z".into()))
        );
        assert_eq!(
            writes.get("Wake time"),
            Some(&PropertyValue::Date("2024-03-02T06:44:05Z".into()))
        );
    }

    #[test]
    fn unparseable_timestamp_is_absent() {
        let schema = schema_with(&[MetricKey::Bedtime]);
        let payload = json!({"sleep": {"dailySleepDTO": {"sleepStartTimestampGMT": "soon"}}});
        assert!(map_payload(MetricFamily::Sleep, &payload, &schema).is_empty());
    }

    #[test]
    fn hrv_checks_summary_then_flat_keys() {
        let schema = schema_with(&[MetricKey::HrvAverage]);
        let nested = json!({"summary": {}, "hrv": {"hrvSummary": {"lastNightAvg": 48.256, "avg": 40}}});
        assert_eq!(
            number(&map_payload(MetricFamily::Health, &nested, &schema), "HRV (ms)"),
            Some(48.26)
        );
        let flat = json!({"sleep": {}, "hrv": {"hrvValue": 51.5}});
        assert_eq!(
            number(&map_payload(MetricFamily::Sleep, &flat, &schema), "HRV (ms)"),
            Some(51.5)
        );
        let empty = json!({"sleep": {}, "hrv": {}});
        assert!(map_payload(MetricFamily::Sleep, &empty, &schema).is_empty());
    }

    #[test]
    fn negative_sentinels_are_absent() {
        let schema = schema_with(&[MetricKey::AverageStress, MetricKey::RestingHeartRate]);
        let payload = json!({"summary": {"averageStressLevel": -1, "restingHeartRate": 52}, "hrv": {}});
        let writes = map_payload(MetricFamily::Health, &payload, &schema);
        assert!(!writes.contains("Avg Stress"));
        assert_eq!(number(&writes, "Resting HR (bpm)"), Some(52.0));
    }
}
