//! Elasticsearch responses for the queries we send, limited to the fields
//! that we read.

use serde::Deserialize;
use serde_json::Value;

use crate::document::{DocumentRef, SavedObject};

/// Response to a search or scroll request.
///
/// Searches are trimmed server-side with `filter_path`, so everything
/// here must tolerate absence.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
}

#[derive(Debug, Default, Deserialize)]
pub struct Hits {
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// `hits.total` is a bare integer up to Elasticsearch 6, and an object
/// carrying a `value` from 7 on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Relation { value: u64 },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(count) => *count,
            TotalHits::Relation { value } => *value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    // typeless responses (Elasticsearch >= 7) report "_doc" or nothing
    #[serde(rename = "_type", default = "default_doc_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source")]
    pub source: Option<Value>,
}

fn default_doc_type() -> String {
    String::from("_doc")
}

impl Hit {
    /// Consume the hit into a saved object, when a source was returned.
    pub fn into_saved_object(self) -> Option<SavedObject> {
        let Hit {
            index,
            doc_type,
            id,
            source,
        } = self;
        source.map(|source| SavedObject {
            id,
            index: Some(index),
            source,
            doc_type,
        })
    }
}

impl From<Hit> for DocumentRef {
    fn from(hit: Hit) -> DocumentRef {
        DocumentRef {
            index: hit.index,
            doc_type: hit.doc_type,
            id: hit.id,
        }
    }
}

/// Response to a multi-get request.
#[derive(Debug, Deserialize)]
pub struct MgetResponse {
    pub docs: Vec<Hit>,
}

/// Response to a bulk request. Success or failure is evaluated for the
/// whole batch through the `errors` flag.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}
