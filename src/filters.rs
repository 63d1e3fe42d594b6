use crate::models::{ActiveFilters, FilterDef, FilterOperator, FILTER_KEY_PREFIX, WILDCARD_FILTER_VALUE};

/// Builds query-language filter fragments from board filter definitions.
#[derive(Debug, Clone, Copy)]
pub struct FilterClauseCompiler<'a> {
    defs: &'a [FilterDef],
}

impl<'a> FilterClauseCompiler<'a> {
    pub fn new(defs: &'a [FilterDef]) -> Self {
        Self { defs }
    }

    /// Compiles the active selections into `(d1:v or d2:v) and (d3:w)`.
    ///
    /// Each definition is emitted at most once, at the position of the first
    /// active key that names one of its dimensions. Wildcard values and keys
    /// without a matching definition emit nothing.
    pub fn compile(&self, active: &ActiveFilters) -> String {
        let mut emitted = vec![false; self.defs.len()];
        let mut fragments = Vec::new();

        for (key, _) in active.iter() {
            let dimension = filter_dimension(key);
            for (index, def) in self.defs.iter().enumerate() {
                if emitted[index] || !def.covers(dimension) {
                    continue;
                }
                emitted[index] = true;

                let Some(value) = effective_value(def, active) else {
                    tracing::trace!(filter = %def.name, "filter has neither a selection nor a default");
                    continue;
                };
                if value == WILDCARD_FILTER_VALUE {
                    continue;
                }
                if let Some(fragment) = disjunction(def, &format_value(&def.operator, value)) {
                    fragments.push(fragment);
                }
            }
        }

        fragments.join(" and ")
    }

    /// Whether `column` is one of the board's filterable dimensions.
    ///
    /// This only reflects the board definitions: a column can be filterable
    /// while no value is currently selected for it.
    pub fn has_active_filter(&self, column: &str) -> bool {
        self.defs
            .iter()
            .any(|def| def.dimensions().any(|dimension| dimension == column))
    }
}

pub fn compile(defs: &[FilterDef], active: &ActiveFilters) -> String {
    FilterClauseCompiler::new(defs).compile(active)
}

pub fn has_active_filter(defs: &[FilterDef], column: &str) -> bool {
    FilterClauseCompiler::new(defs).has_active_filter(column)
}

/// Applies operator shaping, then escapes every space.
pub fn format_value(operator: &FilterOperator, raw: &str) -> String {
    let shaped = match operator {
        FilterOperator::Like => format!("*{}*", raw.replace('%', "*")),
        FilterOperator::Equals => format!("\"{raw}\""),
        FilterOperator::In | FilterOperator::Other(_) => raw.to_string(),
    };
    shaped.replace(' ', "\\ ")
}

fn filter_dimension(key: &str) -> &str {
    key.strip_prefix(FILTER_KEY_PREFIX).unwrap_or(key)
}

fn effective_value<'v>(def: &'v FilterDef, active: &'v ActiveFilters) -> Option<&'v str> {
    active
        .iter()
        .filter(|(key, _)| def.covers(filter_dimension(key)))
        .find_map(|(_, value)| value)
        .or(def.default.as_deref())
}

fn disjunction(def: &FilterDef, value: &str) -> Option<String> {
    let terms = def
        .dimensions()
        .map(|dimension| format!("{dimension}:{value}"))
        .collect::<Vec<_>>();
    if terms.is_empty() {
        return None;
    }
    Some(format!("({})", terms.join(" or ")))
}

#[cfg(test)]
mod tests {
    use super::{compile, format_value, has_active_filter};
    use crate::models::{ActiveFilters, FilterDef, FilterOperator};

    fn def(name: &str, operator: &str, default: Option<&str>) -> FilterDef {
        FilterDef {
            name: name.to_string(),
            operator: FilterOperator::from(operator.to_string()),
            default: default.map(ToString::to_string),
        }
    }

    #[test]
    fn equals_value_is_quoted_then_space_escaped() {
        let defs = vec![def("host", "=", Some("*"))];
        let mut active = ActiveFilters::new();
        active.select("host", "my host");
        assert_eq!(compile(&defs, &active), "(host:\"my\\ host\")");
    }

    #[test]
    fn or_group_uses_default_without_override() {
        let defs = vec![def("a,b", "LIKE", Some("x"))];
        let mut active = ActiveFilters::new();
        active.set("filter_a,b", None);
        assert_eq!(compile(&defs, &active), "(a:*x* or b:*x*)");
    }

    #[test]
    fn dimension_key_matches_grouped_definition() {
        let defs = vec![def("host,hostname", "=", Some("*"))];
        let mut active = ActiveFilters::new();
        active.select("hostname", "web-1");
        assert_eq!(compile(&defs, &active), "(host:\"web-1\" or hostname:\"web-1\")");
    }

    #[test]
    fn wildcard_suppresses_the_definition() {
        let defs = vec![def("appName", "=", Some("checkout")), def("region,zone", "LIKE", Some("eu"))];
        let mut active = ActiveFilters::new();
        active.select("appName", "*");
        active.set("filter_region,zone", None);
        let clause = compile(&defs, &active);
        assert!(!clause.contains("appName"));
        assert_eq!(clause, "(region:*eu* or zone:*eu*)");
    }

    #[test]
    fn fragments_are_conjoined_in_selection_order() {
        let defs = vec![def("appName", "=", None), def("status", "IN", None)];
        let mut active = ActiveFilters::new();
        active.select("status", "(200, 404)");
        active.select("appName", "cart");
        assert_eq!(compile(&defs, &active), "(status:(200,\\ 404)) and (appName:\"cart\")");
    }

    #[test]
    fn unmatched_and_empty_selections_emit_nothing() {
        let defs = vec![def("appName", "=", None)];
        let mut active = ActiveFilters::new();
        assert_eq!(compile(&defs, &active), "");

        active.select("unknown", "value");
        assert_eq!(compile(&defs, &active), "");

        active.set("filter_appName", None);
        assert_eq!(compile(&defs, &active), "");
    }

    #[test]
    fn numeric_cell_selection_is_quoted_as_text() {
        let defs = vec![def("httpResponseCode", "=", None)];
        let active: ActiveFilters =
            serde_json::from_value(serde_json::json!({ "filter_httpResponseCode": { "value": 200 } }))
                .expect("parse filters");
        assert_eq!(compile(&defs, &active), "(httpResponseCode:\"200\")");
    }

    #[test]
    fn like_replaces_percent_wildcards() {
        assert_eq!(format_value(&FilterOperator::Like, "web%prod"), "*web*prod*");
        assert_eq!(format_value(&FilterOperator::Other(">".to_string()), "5 0"), "5\\ 0");
    }

    #[test]
    fn highlighting_ignores_current_selection() {
        let defs = vec![def("host,hostname", "=", Some("*"))];
        assert!(has_active_filter(&defs, "hostname"));
        assert!(has_active_filter(&defs, "host"));
        assert!(!has_active_filter(&defs, "appName"));
        assert!(!has_active_filter(&defs, "host,hostname"));
    }
}
