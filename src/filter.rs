use serde_json::{json, Value};
use tracing::warn;

/// One of the three predefined selection predicates over the Kibana
/// metadata index. Ids starting with `_` mark internal/client documents
/// by convention; `Filtered` and `Client` partition the index along that
/// prefix, `All` matches everything.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryFilter {
    All,
    Filtered,
    Client,
}

impl Default for QueryFilter {
    fn default() -> Self {
        QueryFilter::All
    }
}

impl QueryFilter {
    /// Resolve a filter from its command-line name. Unrecognized or
    /// absent names fall back to `All`.
    pub fn from_name(name: Option<&str>) -> QueryFilter {
        match name {
            Some("client") => QueryFilter::Client,
            Some("filtered") => QueryFilter::Filtered,
            Some("all") | None => QueryFilter::All,
            Some(other) => {
                warn!("unrecognized filter '{}', defaulting to 'all'", other);
                QueryFilter::All
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryFilter::All => "all",
            QueryFilter::Filtered => "filtered",
            QueryFilter::Client => "client",
        }
    }

    /// The query DSL body selecting the documents of this filter.
    pub fn body(&self) -> Value {
        match self {
            QueryFilter::All => json!({
                "query": { "match_all": {} }
            }),
            QueryFilter::Filtered => json!({
                "query": {
                    "bool": {
                        "must": { "match_all": {} },
                        "must_not": { "prefix": { "_id": "_" } }
                    }
                }
            }),
            QueryFilter::Client => json!({
                "query": { "prefix": { "_id": "_" } }
            }),
        }
    }

    /// Local equivalent of the selection predicate, mirroring the query
    /// DSL of `body`.
    pub fn matches(&self, id: &str) -> bool {
        match self {
            QueryFilter::All => true,
            QueryFilter::Filtered => !id.starts_with('_'),
            QueryFilter::Client => id.starts_with('_'),
        }
    }
}

impl std::fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_resolve_filter_names_by_equality() {
        assert_eq!(QueryFilter::from_name(Some("client")), QueryFilter::Client);
        assert_eq!(
            QueryFilter::from_name(Some("filtered")),
            QueryFilter::Filtered
        );
        assert_eq!(QueryFilter::from_name(Some("all")), QueryFilter::All);
        // owned strings must resolve too, not only interned literals
        let name = String::from("cli") + "ent";
        assert_eq!(
            QueryFilter::from_name(Some(name.as_str())),
            QueryFilter::Client
        );
    }

    #[test]
    fn should_default_to_all_when_absent_or_unrecognized() {
        assert_eq!(QueryFilter::from_name(None), QueryFilter::All);
        assert_eq!(QueryFilter::from_name(Some("bogus")), QueryFilter::All);
        assert_eq!(QueryFilter::default(), QueryFilter::All);
    }

    #[test]
    fn should_render_query_bodies() {
        assert_eq!(
            QueryFilter::All.body(),
            serde_json::json!({"query": {"match_all": {}}})
        );
        assert_eq!(
            QueryFilter::Client.body(),
            serde_json::json!({"query": {"prefix": {"_id": "_"}}})
        );
        let filtered = QueryFilter::Filtered.body();
        assert_eq!(
            filtered["query"]["bool"]["must_not"],
            serde_json::json!({"prefix": {"_id": "_"}})
        );
    }

    #[test]
    fn should_partition_ids_between_filtered_and_client() {
        let ids = ["_search-1", "dash-2", "_", "", "visu_3", "_dashboard"];
        for id in &ids {
            // Filtered ∪ Client == All, Filtered ∩ Client == ∅
            assert!(QueryFilter::All.matches(id));
            assert_eq!(
                QueryFilter::Filtered.matches(id) || QueryFilter::Client.matches(id),
                QueryFilter::All.matches(id)
            );
            assert!(!(QueryFilter::Filtered.matches(id) && QueryFilter::Client.matches(id)));
        }
        assert!(QueryFilter::Client.matches("_search-1"));
        assert!(!QueryFilter::Client.matches("dash-2"));
        assert!(QueryFilter::Filtered.matches("dash-2"));
    }
}
