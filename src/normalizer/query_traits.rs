use once_cell::sync::Lazy;
use regex::Regex;

static FACET_CLAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfacet\b").expect("valid regex"));
static LOG_SOURCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bfrom\s+log\b").expect("valid regex"));

/// What the query text says about the shape of its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryTraits {
    pub faceted: bool,
    pub logs: bool,
}

impl QueryTraits {
    pub fn detect(query: &str) -> Self {
        Self {
            faceted: FACET_CLAUSE.is_match(query),
            logs: LOG_SOURCE.is_match(query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryTraits;

    #[test]
    fn facet_detection_ignores_case() {
        assert!(QueryTraits::detect("SELECT count(*) FROM Transaction facet appName").faceted);
        assert!(QueryTraits::detect("SELECT count(*) FROM Transaction FACET appName, host").faceted);
        assert!(!QueryTraits::detect("SELECT count(*) FROM Transaction TIMESERIES").faceted);
        assert!(!QueryTraits::detect("SELECT facetedSearch FROM Custom").faceted);
    }

    #[test]
    fn log_source_detection() {
        assert!(QueryTraits::detect("SELECT * FROM Log WHERE level = 'error'").logs);
        assert!(QueryTraits::detect("select * from  log").logs);
        assert!(!QueryTraits::detect("SELECT * FROM LogEvent").logs);
    }
}
