//! Converts query result batches into a uniform column/row table.
//!
//! Two result shapes arrive from the query source:
//! - grouped (faceted or `begin_time`-bucketed) results, one entry per series,
//!   which collapse into one row per distinct [`FacetKey`];
//! - flat event/timeseries results, whose records are concatenated as rows.
//!
//! Display formatting (for example rendering the `timestamp` column as a date)
//! is left to the consumer of the table.

pub mod facet_key;
pub mod query_traits;

pub use facet_key::FacetKey;
pub use query_traits::QueryTraits;

use crate::models::{GroupDescriptor, RawResultEntry, Record};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub const BEGIN_TIME_FIELD: &str = "begin_time";
pub const TIMESTAMP_FIELD: &str = "timestamp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormalizationMode {
    Grouped,
    Flat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnInfo {
    Present,
    Unit(Value),
}

impl Serialize for ColumnInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Present => serializer.serialize_bool(true),
            Self::Unit(unit) => unit.serialize(serializer),
        }
    }
}

/// Columns in order of first appearance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnRegistry {
    names: Vec<String>,
    info: HashMap<String, ColumnInfo>,
}

impl ColumnRegistry {
    /// Registers `name`; a unit descriptor replaces whatever was recorded before.
    pub fn register(&mut self, name: &str, info: ColumnInfo) {
        match self.info.get_mut(name) {
            Some(existing) => {
                if matches!(info, ColumnInfo::Unit(_)) {
                    *existing = info;
                }
            }
            None => {
                self.names.push(name.to_string());
                self.info.insert(name.to_string(), info);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.info.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.info.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Serialize for ColumnRegistry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for name in &self.names {
            if let Some(info) = self.info.get(name) {
                map.serialize_entry(name, info)?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTable {
    pub mode: NormalizationMode,
    pub columns: ColumnRegistry,
    pub rows: Vec<Record>,
}

impl NormalizedTable {
    pub fn empty() -> Self {
        Self {
            mode: NormalizationMode::Flat,
            columns: ColumnRegistry::default(),
            rows: Vec::new(),
        }
    }
}

/// Grouped mode applies when the caller flags the batch as faceted or any
/// entry's first record carries `begin_time`.
pub fn detect_mode(entries: &[RawResultEntry], faceted: bool) -> NormalizationMode {
    let bucketed = entries
        .iter()
        .filter_map(|entry| entry.data.first())
        .any(|record| record.contains_key(BEGIN_TIME_FIELD));
    if faceted || bucketed {
        NormalizationMode::Grouped
    } else {
        NormalizationMode::Flat
    }
}

pub fn normalize(entries: &[RawResultEntry], faceted: bool) -> NormalizedTable {
    match detect_mode(entries, faceted) {
        NormalizationMode::Grouped => normalize_grouped(entries),
        NormalizationMode::Flat => normalize_flat(entries),
    }
}

/// Value identifying the data currently held by a batch: the first record's
/// `begin_time`, falling back to its `timestamp`. `None` when the batch has no
/// records at all.
pub fn freshness_marker(entries: &[RawResultEntry]) -> Option<Value> {
    let record = entries.first()?.data.first()?;
    let marker = record
        .get(BEGIN_TIME_FIELD)
        .filter(|value| is_truthy(value))
        .or_else(|| record.get(TIMESTAMP_FIELD))
        .cloned()
        .unwrap_or(Value::Null);
    Some(marker)
}

fn normalize_grouped(entries: &[RawResultEntry]) -> NormalizedTable {
    let mut columns = ColumnRegistry::default();
    let mut rows: Vec<Record> = Vec::new();
    let mut positions: HashMap<FacetKey, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some(groups) = entry.metadata.groups.as_deref().filter(|groups| !groups.is_empty()) else {
            tracing::debug!(entry = index, "skipping grouped result entry without groups");
            continue;
        };
        let Some(record) = entry.data.first() else {
            tracing::debug!(entry = index, "skipping grouped result entry without data");
            continue;
        };
        let Some(metric_key) = metric_key(&groups[0]) else {
            tracing::debug!(entry = index, "skipping grouped result entry without a metric name");
            continue;
        };
        let metric_value = record.get(&metric_key).cloned().unwrap_or(Value::Null);

        let facet_key = FacetKey::from_groups(groups);
        let position = match positions.get(&facet_key) {
            Some(position) => *position,
            None => {
                let mut row = Record::new();
                for group in groups.iter().filter(|group| group.is_facet()) {
                    columns.register(&group.name, ColumnInfo::Present);
                    row.insert(group.name.clone(), group.value.clone());
                }
                rows.push(row);
                positions.insert(facet_key, rows.len() - 1);
                rows.len() - 1
            }
        };

        columns.register(&metric_key, ColumnInfo::Present);
        rows[position].insert(metric_key, metric_value);
    }

    NormalizedTable {
        mode: NormalizationMode::Grouped,
        columns,
        rows,
    }
}

fn normalize_flat(entries: &[RawResultEntry]) -> NormalizedTable {
    let rows: Vec<Record> = entries
        .iter()
        .flat_map(|entry| entry.data.iter().cloned())
        .collect();

    let mut columns = ColumnRegistry::default();
    {
        let row_keys: HashSet<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .collect();

        for entry in entries {
            let Some(units) = entry.metadata.units_data.as_ref() else {
                continue;
            };
            for (name, unit) in units {
                if row_keys.contains(name.as_str()) {
                    columns.register(name, ColumnInfo::Unit(unit.clone()));
                }
            }
        }
    }

    // Keys the unit maps did not describe still need a column.
    for row in &rows {
        for key in row.keys() {
            columns.register(key, ColumnInfo::Present);
        }
    }

    NormalizedTable {
        mode: NormalizationMode::Flat,
        columns,
        rows,
    }
}

fn metric_key(group: &GroupDescriptor) -> Option<String> {
    let key = match &group.value {
        Value::String(text) => text.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    (!key.is_empty()).then_some(key)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|float| float != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{detect_mode, freshness_marker, normalize, ColumnInfo, NormalizationMode};
    use crate::models::{GroupDescriptor, RawResultEntry, Record, ResultMetadata};
    use serde_json::{json, Map, Value};

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("object record")
    }

    fn facet_entry(metric: &str, facets: &[(&str, &str)], metric_value: Value) -> RawResultEntry {
        let mut groups = vec![GroupDescriptor {
            group_type: "function".to_string(),
            name: metric.to_string(),
            value: json!(metric),
        }];
        groups.extend(facets.iter().map(|(name, value)| GroupDescriptor {
            group_type: "facet".to_string(),
            name: name.to_string(),
            value: json!(value),
        }));
        let mut data = Map::new();
        data.insert(metric.to_string(), metric_value);
        RawResultEntry {
            account_id: Some(1),
            query: Some("SELECT count(*), average(duration) FROM Transaction FACET appName".to_string()),
            metadata: ResultMetadata {
                groups: Some(groups),
                units_data: None,
            },
            data: vec![data],
        }
    }

    fn flat_entry(units: Value, data: Vec<Value>) -> RawResultEntry {
        RawResultEntry {
            account_id: Some(1),
            query: Some("SELECT * FROM Transaction".to_string()),
            metadata: ResultMetadata {
                groups: None,
                units_data: units.as_object().cloned(),
            },
            data: data.into_iter().map(record).collect(),
        }
    }

    #[test]
    fn facet_rows_collapse_and_merge_metrics() {
        let entries = vec![
            facet_entry("count", &[("appName", "checkout"), ("host", "web-1")], json!(12)),
            facet_entry("average.duration", &[("appName", "checkout"), ("host", "web-1")], json!(0.4)),
            facet_entry("count", &[("appName", "cart"), ("host", "web-2")], json!(3)),
        ];

        let table = normalize(&entries, true);
        assert_eq!(table.mode, NormalizationMode::Grouped);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0]["appName"], "checkout");
        assert_eq!(table.rows[0]["host"], "web-1");
        assert_eq!(table.rows[0]["count"], 12);
        assert_eq!(table.rows[0]["average.duration"], 0.4);
        assert_eq!(table.rows[1]["appName"], "cart");
        assert!(!table.rows[1].contains_key("average.duration"));

        let names = table.columns.names().collect::<Vec<_>>();
        assert_eq!(names, vec!["appName", "host", "count", "average.duration"]);
    }

    #[test]
    fn later_entry_overwrites_metric_for_same_facet() {
        let entries = vec![
            facet_entry("count", &[("appName", "checkout")], json!(1)),
            facet_entry("count", &[("appName", "checkout")], json!(2)),
        ];
        let table = normalize(&entries, true);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["count"], 2);
    }

    #[test]
    fn null_metric_is_preserved() {
        let entries = vec![facet_entry("max.duration", &[("host", "web-1")], Value::Null)];
        let table = normalize(&entries, true);
        assert_eq!(table.rows[0].get("max.duration"), Some(&Value::Null));
    }

    #[test]
    fn malformed_grouped_entries_are_skipped() {
        let mut empty = facet_entry("count", &[("host", "web-1")], json!(1));
        empty.data.clear();
        let mut groupless = facet_entry("count", &[("host", "web-2")], json!(1));
        groupless.metadata.groups = None;
        let valid = facet_entry("count", &[("host", "web-3")], json!(7));

        let table = normalize(&[empty, groupless, valid], true);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["host"], "web-3");
        assert!(!table.columns.contains(""));
    }

    #[test]
    fn begin_time_switches_to_grouped_mode() {
        let mut entry = facet_entry("count", &[], json!(5));
        entry.data[0].insert("begin_time".to_string(), json!(1_700_000_000_000_i64));
        assert_eq!(detect_mode(std::slice::from_ref(&entry), false), NormalizationMode::Grouped);

        let table = normalize(&[entry], false);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["count"], 5);
    }

    #[test]
    fn bucketed_later_entry_switches_to_grouped_mode() {
        let mut bucketed = facet_entry("count", &[], json!(7));
        bucketed.data[0].insert("begin_time".to_string(), json!(1_700_000_000_000_i64));
        let plain = flat_entry(json!({}), vec![json!({ "name": "a", "count": 1 })]);
        let empty = flat_entry(json!({}), Vec::new());

        let entries = vec![plain, bucketed.clone()];
        assert_eq!(detect_mode(&entries, false), NormalizationMode::Grouped);
        assert_eq!(detect_mode(&[empty, bucketed], false), NormalizationMode::Grouped);

        // The plain entry has no groups and drops out of the grouped table.
        let table = normalize(&entries, false);
        assert_eq!(table.mode, NormalizationMode::Grouped);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["count"], 7);
    }

    #[test]
    fn flat_rows_concatenate_in_entry_order() {
        let entries = vec![
            flat_entry(
                json!({ "timestamp": { "unit": "TIMESTAMP" }, "duration": { "unit": "SECONDS" } }),
                vec![
                    json!({ "timestamp": 3, "duration": 0.1 }),
                    json!({ "timestamp": 2, "duration": 0.2 }),
                ],
            ),
            flat_entry(
                json!({ "timestamp": { "unit": "TIMESTAMP" }, "host": { "unit": "UNKNOWN" } }),
                vec![json!({ "timestamp": 1, "host": "web-1" })],
            ),
        ];

        let table = normalize(&entries, false);
        assert_eq!(table.mode, NormalizationMode::Flat);
        let stamps = table.rows.iter().map(|row| row["timestamp"].clone()).collect::<Vec<_>>();
        assert_eq!(stamps, vec![json!(3), json!(2), json!(1)]);
        assert_eq!(
            table.columns.get("duration"),
            Some(&ColumnInfo::Unit(json!({ "unit": "SECONDS" })))
        );
    }

    #[test]
    fn flat_columns_are_exactly_the_row_keys() {
        let entries = vec![
            flat_entry(
                json!({ "timestamp": { "unit": "TIMESTAMP" }, "ghost": { "unit": "COUNT" } }),
                vec![json!({ "timestamp": 1, "message": "boot" })],
            ),
            flat_entry(Value::Null, vec![json!({ "timestamp": 2, "level": "warn" })]),
        ];

        let table = normalize(&entries, false);
        for row in &table.rows {
            for key in row.keys() {
                assert!(table.columns.contains(key), "missing column {key}");
            }
        }
        for name in table.columns.names() {
            assert!(table.rows.iter().any(|row| row.contains_key(name)), "orphan column {name}");
        }
        assert!(!table.columns.contains("ghost"));
    }

    #[test]
    fn freshness_marker_prefers_begin_time() {
        let bucketed = flat_entry(Value::Null, vec![json!({ "begin_time": 10, "timestamp": 20 })]);
        assert_eq!(freshness_marker(std::slice::from_ref(&bucketed)), Some(json!(10)));

        let events = flat_entry(Value::Null, vec![json!({ "begin_time": 0, "timestamp": 20 })]);
        assert_eq!(freshness_marker(std::slice::from_ref(&events)), Some(json!(20)));

        let empty = flat_entry(Value::Null, vec![]);
        assert_eq!(freshness_marker(&[empty]), None);
        assert_eq!(freshness_marker(&[]), None);
    }
}
