use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::value::{FieldValue, Row, Timestamp};

/// Key carrying the batch timestamp on every normalized record.
pub const CREATED_AT: &str = "createdAt";

/// Payload of one upload batch: the decoded rows, or a single stored object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchData {
    Rows(Vec<Row>),
    Single(Row),
}

/// One upload event as read back from the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBatch {
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    #[serde(default)]
    pub data: Option<BatchData>,
}

impl UploadBatch {
    pub fn new(created_at: Timestamp, data: BatchData) -> Self {
        UploadBatch {
            created_at: Some(created_at),
            data: Some(data),
        }
    }
}

/// A row merged with exactly one `createdAt` timestamp.
pub type NormalizedRecord = Row;

/// Flatten upload batches into individually timestamped records.
///
/// Batches without a timestamp or payload are skipped silently. Rows of an
/// array payload each inherit the batch timestamp, which is placed first and
/// overrides any `createdAt` column of the row. A single-object payload is
/// kept in its stored shape, `{ createdAt, data }`.
///
/// Output follows batch order, then row order within a batch.
pub fn normalize(batches: &[UploadBatch]) -> Vec<NormalizedRecord> {
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for batch in batches {
        let (Some(created_at), Some(data)) = (&batch.created_at, &batch.data) else {
            skipped += 1;
            continue;
        };

        match data {
            BatchData::Rows(rows) => {
                records.extend(rows.iter().map(|row| stamp(*created_at, row)));
            }
            BatchData::Single(row) => {
                let mut record = Row::with_capacity(2);
                record.insert(CREATED_AT, *created_at);
                record.insert("data", FieldValue::Map(row.clone()));
                records.push(record);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} upload batches missing createdAt or data", skipped);
    }
    debug!("Normalized {} batches into {} records", batches.len(), records.len());
    records
}

fn stamp(created_at: Timestamp, row: &Row) -> NormalizedRecord {
    let mut record = Row::with_capacity(row.len() + 1);
    record.insert(CREATED_AT, created_at);
    for (key, value) in row.iter() {
        if key != CREATED_AT {
            record.insert(key, value.clone());
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn array_payload_is_flattened_with_batch_timestamp() {
        let batch = UploadBatch::new(
            ts(),
            BatchData::Rows(vec![
                Row::from_pairs([("a", FieldValue::Int(1))]),
                Row::from_pairs([("b", FieldValue::Int(2))]),
            ]),
        );
        let records = normalize(&[batch]);
        assert_eq!(
            records,
            vec![
                Row::from_pairs([(CREATED_AT, FieldValue::from(ts())), ("a", FieldValue::Int(1))]),
                Row::from_pairs([(CREATED_AT, FieldValue::from(ts())), ("b", FieldValue::Int(2))]),
            ]
        );
    }

    #[test]
    fn invalid_batches_are_excluded() {
        let missing_ts = UploadBatch {
            created_at: None,
            data: Some(BatchData::Rows(vec![Row::from_pairs([("a", "1")])])),
        };
        let missing_data = UploadBatch {
            created_at: Some(ts()),
            data: None,
        };
        assert!(normalize(&[missing_ts, missing_data]).is_empty());
    }

    #[test]
    fn batch_timestamp_wins_over_row_field() {
        let row = Row::from_pairs([("x", "1"), (CREATED_AT, "yesterday")]);
        let records = normalize(&[UploadBatch::new(ts(), BatchData::Rows(vec![row]))]);
        assert_eq!(records[0].get(CREATED_AT), Some(&FieldValue::Timestamp(ts())));
        assert_eq!(records[0].keys().collect::<Vec<_>>(), vec![CREATED_AT, "x"]);
    }

    #[test]
    fn single_payload_keeps_stored_shape() {
        let row = Row::from_pairs([("k", "v")]);
        let records = normalize(&[UploadBatch::new(ts(), BatchData::Single(row.clone()))]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get(CREATED_AT), Some(&FieldValue::Timestamp(ts())));
        assert_eq!(records[0].get("data"), Some(&FieldValue::Map(row)));
    }

    #[test]
    fn preserves_batch_then_row_order() {
        let later = ts() + chrono::Duration::seconds(10);
        let records = normalize(&[
            UploadBatch::new(ts(), BatchData::Rows(vec![Row::from_pairs([("n", "1")]), Row::from_pairs([("n", "2")])])),
            UploadBatch::new(later, BatchData::Rows(vec![Row::from_pairs([("n", "3")])])),
        ]);
        let order: Vec<String> = records.iter().map(|r| r.get("n").unwrap().to_string()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
        assert_eq!(records[2].get(CREATED_AT), Some(&FieldValue::Timestamp(later)));
    }

    #[test]
    fn stored_json_shape_deserializes() {
        let json = r#"{"createdAt":"2024-01-02T03:04:05Z","data":[{"a":{"kind":"text","value":"1"}}]}"#;
        let batch: UploadBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.created_at, Some(ts()));
        assert!(matches!(batch.data, Some(BatchData::Rows(ref rows)) if rows.len() == 1));

        let empty: UploadBatch = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(normalize(&[empty]).is_empty());
    }
}
