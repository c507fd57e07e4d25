use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A saved object from the Kibana metadata index: a dashboard, a
/// visualization, a saved search or an index-pattern definition.
///
/// This is also the record shape of dump files: `_type`, `_id` and
/// `_source` are required, `_index` is written on export and ignored on
/// import, where the destination index comes from the storage
/// configuration.
///
/// Field order matters: dumps are written with lexicographically sorted
/// keys, and serde emits struct fields in declaration order.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SavedObject {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_index", skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_source")]
    pub source: Value,
    #[serde(rename = "_type")]
    pub doc_type: String,
}

/// Identifier triple of a document, without its source.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DocumentRef {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type")]
    pub doc_type: String,
    #[serde(rename = "_id")]
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_require_type_id_and_source_in_records() {
        let missing_type = json!({"_id": "1", "_source": {"title": "A"}});
        let err = serde_json::from_value::<SavedObject>(missing_type).unwrap_err();
        assert!(err.to_string().contains("_type"));

        let missing_source = json!({"_id": "1", "_type": "dashboard"});
        let err = serde_json::from_value::<SavedObject>(missing_source).unwrap_err();
        assert!(err.to_string().contains("_source"));
    }

    #[test]
    fn should_accept_records_without_index() {
        let record = json!({"_type": "dashboard", "_id": "1", "_source": {"title": "A"}});
        let object = serde_json::from_value::<SavedObject>(record).unwrap();
        assert_eq!(object.index, None);
        assert_eq!(object.doc_type, "dashboard");
        assert_eq!(object.source, json!({"title": "A"}));
    }

    #[test]
    fn should_serialize_with_underscore_keys_in_sorted_order() {
        let object = SavedObject {
            id: String::from("1"),
            index: Some(String::from(".kibana")),
            source: json!({"title": "A"}),
            doc_type: String::from("dashboard"),
        };
        let serialized = serde_json::to_string(&object).unwrap();
        assert_eq!(
            serialized,
            r#"{"_id":"1","_index":".kibana","_source":{"title":"A"},"_type":"dashboard"}"#
        );
    }
}
