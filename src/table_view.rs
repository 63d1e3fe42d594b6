use crate::filters::{compile, FilterClauseCompiler};
use crate::models::{ActiveFilters, FilterDef, RawResultEntry, Record, Widget};
use crate::normalizer::{freshness_marker, normalize, NormalizedTable, QueryTraits, TIMESTAMP_FIELD};
use chrono::{Local, TimeZone};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Display;
use std::sync::Arc;

pub const LOG_TAILER_TARGET: &str = "logger.log-tailer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortState {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderCell {
    pub name: String,
    pub sorted: Option<SortDirection>,
    pub filterable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyCell {
    pub column: String,
    pub text: String,
    pub filterable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsUrlState {
    pub query: String,
    pub account_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsLink {
    pub id: String,
    pub url_state: LogsUrlState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDisplay {
    pub compact: bool,
    pub single_line: bool,
    pub fixed: bool,
    pub striped: bool,
}

impl TableDisplay {
    pub fn from_widget(widget: &Widget) -> Self {
        Self {
            compact: widget.flag("compact"),
            single_line: widget.flag("singleLine"),
            fixed: widget.flag("fixed"),
            striped: widget.flag("striped"),
        }
    }
}

/// View state of a table widget over a stream of query result batches.
///
/// Normalization only re-runs when the batch's freshness marker changes, and
/// every re-run makes all columns visible again.
#[derive(Debug, Clone)]
pub struct ResultTable {
    marker: Option<Value>,
    table: Arc<NormalizedTable>,
    account_id: Option<i64>,
    logs: bool,
    visible_columns: Vec<String>,
    sort: Option<SortState>,
}

impl Default for ResultTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultTable {
    pub fn new() -> Self {
        Self {
            marker: None,
            table: Arc::new(NormalizedTable::empty()),
            account_id: None,
            logs: false,
            visible_columns: Vec::new(),
            sort: None,
        }
    }

    /// Returns whether the batch was normalized.
    pub fn refresh(&mut self, entries: &[RawResultEntry]) -> bool {
        let Some(marker) = freshness_marker(entries) else {
            return false;
        };
        if self.marker.as_ref() == Some(&marker) {
            return false;
        }

        let first = &entries[0];
        let traits = first.query.as_deref().map(QueryTraits::detect).unwrap_or_default();
        let table = normalize(entries, traits.faceted);
        tracing::debug!(
            mode = ?table.mode,
            rows = table.rows.len(),
            columns = table.columns.len(),
            "result table normalized"
        );

        self.visible_columns = table.columns.names().map(ToString::to_string).collect();
        self.table = Arc::new(table);
        self.account_id = first.account_id;
        self.logs = traits.logs;
        self.marker = Some(marker);
        true
    }

    pub fn table(&self) -> Arc<NormalizedTable> {
        Arc::clone(&self.table)
    }

    pub fn account_id(&self) -> Option<i64> {
        self.account_id
    }

    pub fn is_logs(&self) -> bool {
        self.logs
    }

    pub fn visible_columns(&self) -> &[String] {
        &self.visible_columns
    }

    pub fn sort(&self) -> Option<&SortState> {
        self.sort.as_ref()
    }

    pub fn set_column_visible(&mut self, column: &str, visible: bool) {
        if visible {
            if !self.visible_columns.iter().any(|existing| existing == column) {
                self.visible_columns.push(column.to_string());
            }
        } else {
            self.visible_columns.retain(|existing| existing != column);
        }
    }

    /// Sorts by `column`, flipping the direction on every call.
    pub fn toggle_sort(&mut self, column: &str) {
        let direction = match self.sort.as_ref().map(|sort| sort.direction) {
            Some(SortDirection::Ascending) => SortDirection::Descending,
            _ => SortDirection::Ascending,
        };
        self.sort = Some(SortState {
            column: column.to_string(),
            direction,
        });
    }

    pub fn sorted_rows(&self) -> Vec<&Record> {
        let mut rows = self.table.rows.iter().collect::<Vec<_>>();
        if let Some(sort) = &self.sort {
            rows.sort_by(|left, right| compare_cells(left.get(&sort.column), right.get(&sort.column)));
            if sort.direction == SortDirection::Descending {
                rows.reverse();
            }
        }
        rows
    }

    pub fn header(&self, filters: &[FilterDef]) -> Vec<HeaderCell> {
        let compiler = FilterClauseCompiler::new(filters);
        self.visible_columns
            .iter()
            .map(|name| HeaderCell {
                name: name.clone(),
                sorted: self
                    .sort
                    .as_ref()
                    .filter(|sort| sort.column == *name)
                    .map(|sort| sort.direction),
                filterable: compiler.has_active_filter(name),
            })
            .collect()
    }

    pub fn body(&self, filters: &[FilterDef]) -> Vec<Vec<BodyCell>> {
        self.body_in(filters, &Local)
    }

    pub fn body_in<Tz>(&self, filters: &[FilterDef], tz: &Tz) -> Vec<Vec<BodyCell>>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let compiler = FilterClauseCompiler::new(filters);
        self.sorted_rows()
            .into_iter()
            .map(|row| {
                self.visible_columns
                    .iter()
                    .map(|column| BodyCell {
                        column: column.clone(),
                        text: display_cell(column, row.get(column), tz),
                        filterable: compiler.has_active_filter(column),
                    })
                    .collect()
            })
            .collect()
    }

    /// Navigation target for opening log results in the log viewer.
    pub fn logs_link(&self, filters: &[FilterDef], active: &ActiveFilters) -> Option<LogsLink> {
        if !self.logs {
            return None;
        }
        Some(LogsLink {
            id: LOG_TAILER_TARGET.to_string(),
            url_state: LogsUrlState {
                query: compile(filters, active),
                account_id: self.account_id,
            },
        })
    }
}

/// Cell text: empty for null or missing values, and a date-time for the
/// `timestamp` column when it holds epoch milliseconds.
pub fn display_cell<Tz>(column: &str, value: Option<&Value>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(value) = value else {
        return String::new();
    };
    if column == TIMESTAMP_FIELD {
        if let Some(millis) = value.as_i64().or_else(|| value.as_f64().map(|float| float as i64)) {
            if let Some(moment) = tz.timestamp_millis_opt(millis).single() {
                return moment.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string();
            }
        }
    }
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn compare_cells(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left_rank = rank(left);
    let right_rank = rank(right);
    if left_rank != right_rank {
        return left_rank.cmp(&right_rank);
    }
    match (left, right) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
        _ => Ordering::Equal,
    }
}

// Missing and null values sort after everything else.
fn rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(_)) => 0,
        Some(Value::String(_)) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Array(_)) | Some(Value::Object(_)) => 3,
        Some(Value::Null) | None => 4,
    }
}
