use hsync_core::{ColumnWriteSet, DestinationRecord};

/// Candidate writes whose stored value differs from the candidate.
///
/// Only columns the existing record carries are compared. A stored empty
/// value differs from any candidate value.
pub fn changed_columns(existing: &DestinationRecord, candidate: &ColumnWriteSet) -> ColumnWriteSet {
    candidate
        .iter()
        .filter(|(column, value)| {
            existing
                .properties
                .get(column.as_str())
                .is_some_and(|stored| stored != *value)
        })
        .map(|(column, value)| (column.clone(), value.clone()))
        .collect()
}

pub fn needs_update(existing: &DestinationRecord, candidate: &ColumnWriteSet) -> bool {
    !changed_columns(existing, candidate).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsync_core::PropertyValue;
    use std::collections::BTreeMap;

    fn record(pairs: &[(&str, PropertyValue)]) -> DestinationRecord {
        DestinationRecord {
            id: "page-1".into(),
            properties: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn writes(pairs: &[(&str, PropertyValue)]) -> ColumnWriteSet {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn equal_values_need_no_update() {
        let pairs = [
            ("Total Steps", PropertyValue::Number(8000.0)),
            ("Date", PropertyValue::Date("2024-03-01".into())),
            ("Name", PropertyValue::Title("Walking".into())),
        ];
        assert!(!needs_update(&record(&pairs), &writes(&pairs)));
    }

    #[test]
    fn any_single_difference_needs_update() {
        let stored = record(&[
            ("Total Steps", PropertyValue::Number(8000.0)),
            ("Step Goal", PropertyValue::Number(10000.0)),
        ]);
        let candidate = writes(&[
            ("Total Steps", PropertyValue::Number(8200.0)),
            ("Step Goal", PropertyValue::Number(10000.0)),
        ]);
        assert!(needs_update(&stored, &candidate));
        assert_eq!(
            changed_columns(&stored, &candidate).column_names(),
            vec!["Total Steps".to_string()]
        );
    }

    #[test]
    fn stored_empty_differs_from_a_value() {
        let stored = record(&[("Score", PropertyValue::Empty)]);
        let candidate = writes(&[("Score", PropertyValue::Number(82.0))]);
        assert!(needs_update(&stored, &candidate));
    }

    #[test]
    fn columns_absent_from_the_record_are_not_compared() {
        let stored = record(&[("Total Steps", PropertyValue::Number(8000.0))]);
        let candidate = writes(&[
            ("Total Steps", PropertyValue::Number(8000.0)),
            ("HRV (ms)", PropertyValue::Number(48.0)),
        ]);
        assert!(!needs_update(&stored, &candidate));
    }
}
