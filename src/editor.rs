use crate::errors::{AppError, AppResult};
use crate::models::{new_widget_id, BoardDocument, EntityWidgetDefaults, Widget, WidgetType};
use serde::{Deserialize, Serialize};
use serde_json::Map;

/// Editable state of an entity-search widget before it is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityWidgetDraft {
    pub id: Option<String>,
    pub name: String,
    pub value: String,
    pub limit: i64,
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl EntityWidgetDraft {
    pub fn new(defaults: &EntityWidgetDefaults) -> Self {
        Self {
            id: None,
            name: String::new(),
            value: defaults.search.clone(),
            limit: 0,
            x: 0,
            y: 0,
            w: defaults.w,
            h: defaults.h,
        }
    }

    /// Called by the owning view when the editor opens; loads the widget being
    /// edited, if any.
    pub fn on_open(&mut self, existing: Option<&Widget>) {
        let Some(widget) = existing else {
            return;
        };
        self.id = Some(widget.id.clone());
        self.name = widget.name.clone();
        self.value = widget.value.clone().unwrap_or_default();
        self.limit = widget.limit.unwrap_or(0);
        self.x = widget.x;
        self.y = widget.y;
        self.w = widget.w;
        self.h = widget.h;
    }

    pub fn set_limit_input(&mut self, raw: &str) {
        self.limit = parse_limit(raw);
    }

    pub fn can_submit(&self) -> bool {
        !self.name.trim().is_empty() && !self.value.trim().is_empty()
    }

    pub fn to_widget(&self) -> Widget {
        Widget {
            id: self.id.clone().unwrap_or_else(new_widget_id),
            name: self.name.clone(),
            widget_type: WidgetType::EntityHdv,
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
            value: Some(self.value.clone()),
            limit: Some(self.limit),
            config: Map::new(),
        }
    }
}

/// Entity limit from free text: the leading integer, or 0 (no limit).
pub fn parse_limit(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let digits_end = trimmed
        .char_indices()
        .find(|(index, ch)| !(ch.is_ascii_digit() || (*index == 0 && (*ch == '-' || *ch == '+'))))
        .map(|(index, _)| index)
        .unwrap_or(trimmed.len());
    trimmed[..digits_end].parse::<i64>().map(|limit| limit.max(0)).unwrap_or(0)
}

/// Returns a copy of `document` with `widget` replacing the widget at
/// `widget_no`, or appended when no index is given. A replaced widget keeps
/// its id.
pub fn upsert_widget(
    document: &BoardDocument,
    mut widget: Widget,
    widget_no: Option<usize>,
) -> AppResult<BoardDocument> {
    let mut next = document.clone();
    match widget_no {
        Some(index) => {
            let Some(slot) = next.widgets.get_mut(index) else {
                return Err(AppError::NotFound(format!(
                    "widget {} does not exist on a board with {} widgets",
                    index,
                    document.widgets.len()
                )));
            };
            widget.id = slot.id.clone();
            *slot = widget;
        }
        None => next.widgets.push(widget),
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::{parse_limit, upsert_widget, EntityWidgetDraft};
    use crate::models::{BoardDocument, EntityWidgetDefaults, WidgetType};

    #[test]
    fn new_draft_uses_entity_defaults() {
        let draft = EntityWidgetDraft::new(&EntityWidgetDefaults::default());
        assert_eq!(draft.value, "domain IN ('INFRA', 'APM')");
        assert_eq!((draft.w, draft.h), (7, 5));
        assert!(!draft.can_submit());
    }

    #[test]
    fn limit_input_parses_leading_integer() {
        assert_eq!(parse_limit("25"), 25);
        assert_eq!(parse_limit(" 12 hosts"), 12);
        assert_eq!(parse_limit("many"), 0);
        assert_eq!(parse_limit("-3"), 0);
        assert_eq!(parse_limit(""), 0);
    }

    #[test]
    fn editing_index_zero_replaces_in_place() {
        let mut draft = EntityWidgetDraft::new(&EntityWidgetDefaults::default());
        draft.name = "hosts".to_string();
        let document = upsert_widget(&BoardDocument::default(), draft.to_widget(), None).expect("append");
        let original_id = document.widgets[0].id.clone();

        let mut edit = EntityWidgetDraft::new(&EntityWidgetDefaults::default());
        edit.on_open(Some(&document.widgets[0]));
        assert_eq!(edit.name, "hosts");
        edit.name = "apm hosts".to_string();
        edit.set_limit_input("10");

        let mut replacement = edit.to_widget();
        replacement.id = "fresh".to_string();
        let updated = upsert_widget(&document, replacement, Some(0)).expect("replace");
        assert_eq!(updated.widgets.len(), 1);
        assert_eq!(updated.widgets[0].id, original_id);
        assert_eq!(updated.widgets[0].name, "apm hosts");
        assert_eq!(updated.widgets[0].limit, Some(10));
        assert_eq!(updated.widgets[0].widget_type, WidgetType::EntityHdv);
        assert_eq!(document.widgets[0].name, "hosts");
    }

    #[test]
    fn out_of_range_edit_is_rejected() {
        let draft = EntityWidgetDraft::new(&EntityWidgetDefaults::default());
        assert!(upsert_widget(&BoardDocument::default(), draft.to_widget(), Some(3)).is_err());
    }
}
