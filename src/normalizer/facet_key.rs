use crate::models::GroupDescriptor;
use serde_json::Value;
use std::fmt;

/// Identity of one grouped result row: the ordered facet dimensions of an entry.
///
/// Equality and hashing are defined over the `(name, value)` pairs, so dimension
/// values may contain any characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FacetKey {
    dimensions: Vec<FacetDimension>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FacetDimension {
    pub name: String,
    /// Textual form used for identity; numbers and strings with equal text collapse.
    pub value: String,
}

impl FacetKey {
    pub fn from_groups(groups: &[GroupDescriptor]) -> Self {
        let dimensions = groups
            .iter()
            .filter(|group| group.is_facet())
            .map(|group| FacetDimension {
                name: group.name.clone(),
                value: value_text(&group.value),
            })
            .collect();
        Self { dimensions }
    }

    pub fn dimensions(&self) -> &[FacetDimension] {
        &self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, dimension) in self.dimensions.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", dimension.name, dimension.value)?;
        }
        Ok(())
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
