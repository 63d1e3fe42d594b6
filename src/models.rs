use crate::editor::parse_limit;
use serde::de::{Error as _, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

pub const FILTER_KEY_PREFIX: &str = "filter_";
pub const WILDCARD_FILTER_VALUE: &str = "*";

/// One record of a query result, keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WidgetType {
    Nrql,
    Html,
    EntityHdv,
    Other(String),
}

impl WidgetType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Nrql => "nrql",
            Self::Html => "html",
            Self::EntityHdv => "entityhdv",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

impl Default for WidgetType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for WidgetType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "nrql" => Self::Nrql,
            "html" => Self::Html,
            "entityhdv" => Self::EntityHdv,
            _ => Self::Other(value),
        }
    }
}

impl From<WidgetType> for String {
    fn from(value: WidgetType) -> Self {
        match value {
            WidgetType::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(default = "new_widget_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub widget_type: WidgetType,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub x: i32,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub y: i32,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub w: i32,
    #[serde(default, deserialize_with = "lenient_coordinate")]
    pub h: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_limit")]
    pub limit: Option<i64>,
    /// Widget-type specific configuration (queries, chart settings, props).
    #[serde(flatten)]
    pub config: Map<String, Value>,
}

pub fn new_widget_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Widget {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }

    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.x = geometry.x;
        self.y = geometry.y;
        self.w = geometry.w;
        self.h = geometry.h;
    }

    /// Key used by index-addressed grids: `w_<index>_<name>`.
    pub fn legacy_layout_key(&self, index: usize) -> String {
        format!("w_{}_{}", index, self.name)
    }

    /// Display props stored as strings (`"true"` / `"false"`) by the widget editors.
    pub fn flag(&self, prop: &str) -> bool {
        self.config
            .get("props")
            .and_then(|props| props.get(prop))
            .map(|value| match value {
                Value::String(raw) => raw == "true",
                Value::Bool(flag) => *flag,
                _ => false,
            })
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardDocument {
    #[serde(default, deserialize_with = "null_as_default")]
    pub widgets: Vec<Widget>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<FilterDef>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub styles: Vec<StyleDef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BoardDocument {
    pub fn widget_index(&self, widget_id: &str) -> Option<usize> {
        self.widgets.iter().position(|widget| widget.id == widget_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterOperator {
    Equals,
    Like,
    In,
    Other(String),
}

impl Default for FilterOperator {
    fn default() -> Self {
        Self::Equals
    }
}

impl From<String> for FilterOperator {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed == "=" {
            Self::Equals
        } else if trimmed.eq_ignore_ascii_case("like") {
            Self::Like
        } else if trimmed.eq_ignore_ascii_case("in") {
            Self::In
        } else {
            Self::Other(value)
        }
    }
}

impl From<FilterOperator> for String {
    fn from(value: FilterOperator) -> Self {
        match value {
            FilterOperator::Equals => "=".to_string(),
            FilterOperator::Like => "LIKE".to_string(),
            FilterOperator::In => "IN".to_string(),
            FilterOperator::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDef {
    /// One or more dimension names joined by `,`.
    pub name: String,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default, deserialize_with = "optional_scalar_text")]
    pub default: Option<String>,
}

impl FilterDef {
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.name
            .split(',')
            .map(str::trim)
            .filter(|dimension| !dimension.is_empty())
    }

    pub fn covers(&self, dimension: &str) -> bool {
        self.name == dimension || self.dimensions().any(|candidate| candidate == dimension)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDef {
    pub name: String,
    pub value: String,
}

impl StyleDef {
    pub fn css_rule(&self) -> String {
        format!(".{} * {}", self.name, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFilterValue {
    /// Values picked from table cells arrive as numbers or booleans.
    #[serde(deserialize_with = "scalar_text")]
    pub value: String,
}

/// User-selected filter overrides keyed `filter_<name>`, in selection order.
///
/// A key with no value keeps the filter active with its board default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveFilters {
    entries: Vec<(String, Option<String>)>,
}

impl ActiveFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: Option<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn select(&mut self, filter_name: &str, value: impl Into<String>) {
        self.set(format!("{FILTER_KEY_PREFIX}{filter_name}"), Some(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != key);
        before != self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<Option<&str>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_deref()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for ActiveFilters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            let value = value.as_ref().map(|value| ActiveFilterValue { value: value.clone() });
            map.serialize_entry(key, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ActiveFilters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ActiveFiltersVisitor;

        impl<'de> Visitor<'de> for ActiveFiltersVisitor {
            type Value = ActiveFilters;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of filter keys to optional { value } objects")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut filters = ActiveFilters::new();
                while let Some((key, value)) = access.next_entry::<String, Option<ActiveFilterValue>>()? {
                    filters.set(key, value.map(|entry| entry.value));
                }
                Ok(filters)
            }
        }

        deserializer.deserialize_map(ActiveFiltersVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDescriptor {
    #[serde(rename = "type")]
    pub group_type: String,
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl GroupDescriptor {
    pub fn is_facet(&self) -> bool {
        self.group_type == "facet"
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    #[serde(default)]
    pub groups: Option<Vec<GroupDescriptor>>,
    #[serde(default, rename = "units_data", alias = "unitsData")]
    pub units_data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResultEntry {
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default, alias = "nrqlQuery")]
    pub query: Option<String>,
    #[serde(default)]
    pub metadata: ResultMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<Record>,
}

/// A widget position as reported by the grid after a drag or resize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutItem {
    pub i: String,
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub w: Option<i32>,
    #[serde(default)]
    pub h: Option<i32>,
}

/// A widget projected onto the grid for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridItem {
    pub i: String,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub widget_type: WidgetType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageScope {
    User,
    #[serde(alias = "accounts")]
    Account,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Account => "account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageLocation {
    #[serde(rename = "type")]
    pub scope: StorageScope,
    /// Account id for account-scoped boards.
    #[serde(default)]
    pub value: Option<i64>,
}

impl StorageLocation {
    pub fn user() -> Self {
        Self {
            scope: StorageScope::User,
            value: None,
        }
    }

    pub fn account(account_id: i64) -> Self {
        Self {
            scope: StorageScope::Account,
            value: Some(account_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedBoard {
    #[serde(alias = "value")]
    pub id: String,
    pub document: BoardDocument,
}

/// Response of a document store write. `data` is present only on success.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    #[serde(default)]
    pub data: Option<Value>,
}

impl WriteResponse {
    pub fn is_success(&self) -> bool {
        self.data.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLayoutPayload {
    pub layout: Vec<LayoutItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveWidgetPayload {
    pub widget: Widget,
    pub widget_no: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectBoardPayload {
    pub board_id: String,
    pub storage_location: StorageLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub updated: bool,
    pub board: Option<SelectedBoard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GridSettings {
    pub cols: i32,
    pub row_height: i32,
    /// Size given to widgets without a stored size when projected onto the grid.
    pub render_default_w: i32,
    pub render_default_h: i32,
    /// Size written back when the grid reports a zero or missing size.
    pub reconcile_default_w: i32,
    pub reconcile_default_h: i32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            cols: 30,
            row_height: 30,
            render_default_w: 7,
            render_default_h: 6,
            reconcile_default_w: 6,
            reconcile_default_h: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityWidgetDefaults {
    pub search: String,
    pub w: i32,
    pub h: i32,
}

impl Default for EntityWidgetDefaults {
    fn default() -> Self {
        Self {
            search: "domain IN ('INFRA', 'APM')".to_string(),
            w: 7,
            h: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardsSettings {
    pub collection: String,
    pub data_dir: PathBuf,
    pub log_filter: String,
    pub grid: GridSettings,
    pub entity_widget: EntityWidgetDefaults,
}

impl Default for BoardsSettings {
    fn default() -> Self {
        Self {
            collection: "OpenBoards".to_string(),
            data_dir: PathBuf::from(".open-boards"),
            log_filter: "info".to_string(),
            grid: GridSettings::default(),
            entity_widget: EntityWidgetDefaults::default(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Stored documents may hold null, floats or numeric strings for coordinates.
fn lenient_coordinate<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let coordinate = match raw {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.round() as i64))
            .unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    };
    Ok(coordinate.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32)
}

// The entity editor stored the raw input text as the limit.
fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    let limit = match raw {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))
            .map(|limit| limit.max(0)),
        Some(Value::String(text)) => Some(parse_limit(&text)),
        _ => None,
    };
    Ok(limit)
}

fn text_of_scalar(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(format!("expected a string, number or boolean, got {other}")),
    }
}

fn scalar_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    text_of_scalar(Value::deserialize(deserializer)?)
        .map_err(D::Error::custom)?
        .ok_or_else(|| D::Error::custom("filter value must not be null"))
}

fn optional_scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    text_of_scalar(Value::deserialize(deserializer)?).map_err(D::Error::custom)
}
