use elasticsearch::Elasticsearch;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::utils::deserialize::deserialize_duration;

mod internal;
pub mod models;
pub mod remote;

pub use internal::Error;

/// A wrapper around the elasticsearch client, scoped to one Kibana
/// metadata index. All operations are sequential request/response calls
/// against that index; the instance holds no state across calls beyond
/// its configuration.
#[derive(Clone, Debug)]
pub struct KibanaStorage {
    /// Elasticsearch client
    pub(crate) client: Elasticsearch,
    /// Client configuration, fixed for the lifetime of the instance.
    pub config: KibanaStorageConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct KibanaStorageConfig {
    pub url: Url,
    /// Name of the Kibana metadata index.
    pub index: String,
    /// Restricts searches to a single saved-object type when set.
    pub doc_type: Option<String>,
    /// Timeout used by every call to the server, in milliseconds.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// Lifetime of the scroll cursor between two scroll requests.
    pub scroll_keep_alive: String,
    /// Number of hits per scroll page.
    pub scroll_chunk_size: u64,
    /// Number of operations per bulk request when deleting.
    pub bulk_chunk_size: usize,
}
