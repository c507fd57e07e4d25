use elasticsearch::http::request::JsonBody;
use elasticsearch::http::response::{Exception, Response};
use elasticsearch::{BulkParts, ClearScrollParts, MgetParts, ScrollParts, SearchParts};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use snafu::{ResultExt, Snafu};
use std::pin::Pin;
use tracing::{info, warn};

use super::models::{BulkResponse, MgetResponse, SearchResponse};
use super::KibanaStorage;
use crate::document::{DocumentRef, SavedObject};
use crate::filter::QueryFilter;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Elasticsearch Error
    #[snafu(display("Elasticsearch Error: {} [{}]", source, details))]
    ElasticsearchClient {
        details: String,
        source: elasticsearch::Error,
    },

    /// Elasticsearch Deserialization Error
    #[snafu(display("JSON Elasticsearch Deserialization Error: {}", source))]
    ElasticsearchDeserialization { source: elasticsearch::Error },

    /// Elasticsearch Unhandled Exception
    #[snafu(display("Elasticsearch Unhandled Exception: {}", details))]
    ElasticsearchUnhandledException { details: String },

    /// Elasticsearch Failure without Exception
    #[snafu(display("Elasticsearch Failure without Exception"))]
    ElasticsearchFailureWithoutException,

    /// Elasticsearch Response Missing Scroll Id
    #[snafu(display("Elasticsearch Response Missing Scroll Id"))]
    ElasticsearchResponseMissingScrollId,

    /// Elasticsearch Bulk Failure
    #[snafu(display("Elasticsearch Response: Bulk Failure: {}", details))]
    BulkFailure { details: String },

    /// Invalid JSON Value
    #[snafu(display("JSON Deserialization Invalid: {}", details))]
    JsonInvalid { details: String },
}

impl From<Exception> for Error {
    // There is no clear blueprint to decode an elasticsearch exception;
    // we surface the first root cause's reason when there is one.
    fn from(exception: Exception) -> Error {
        let details = exception
            .error()
            .root_cause()
            .first()
            .and_then(|cause| cause.reason())
            .or_else(|| exception.error().reason())
            .unwrap_or("Unspecified root cause or reason");
        Error::ElasticsearchUnhandledException {
            details: String::from(details),
        }
    }
}

async fn exception_error(response: Response) -> Error {
    match response.exception().await {
        Ok(Some(exception)) => Error::from(exception),
        _ => Error::ElasticsearchFailureWithoutException,
    }
}

async fn scroll_page(response: Response) -> Result<SearchResponse, Error> {
    if response.status_code().is_success() {
        response
            .json::<SearchResponse>()
            .await
            .context(ElasticsearchDeserialization)
    } else {
        Err(exception_error(response).await)
    }
}

#[derive(Debug)]
enum State {
    Start,
    Next(String),
    End(String),
}

type ScrollChunk = (
    stream::Iter<std::vec::IntoIter<Result<DocumentRef, Error>>>,
    State,
);

/// Turn one scroll page into a chunk of identifier records plus the
/// continuation state: keep scrolling while pages have hits, clear the
/// cursor on the first empty page.
fn next_chunk(body: SearchResponse) -> Result<Option<ScrollChunk>, Error> {
    let scroll_id = body
        .scroll_id
        .ok_or(Error::ElasticsearchResponseMissingScrollId)?;
    let state = if body.hits.hits.is_empty() {
        State::End(scroll_id)
    } else {
        State::Next(scroll_id)
    };
    let refs = body
        .hits
        .hits
        .into_iter()
        .map(|hit| Ok(DocumentRef::from(hit)))
        .collect::<Vec<_>>();
    Ok(Some((stream::iter(refs), state)))
}

/// Consume a stream of delete candidates in fixed-size chunks, handing
/// each chunk to the delete operation. Every yielded record goes
/// through exactly once; a failure, from the stream or from a delete,
/// stops the loop. Returns the number of records deleted.
async fn delete_in_chunks<S, F, Fut>(
    stream: S,
    chunk_size: usize,
    mut delete: F,
) -> Result<u64, Error>
where
    S: Stream<Item = Result<DocumentRef, Error>>,
    F: FnMut(Vec<DocumentRef>) -> Fut,
    Fut: std::future::Future<Output = Result<(), Error>>,
{
    let chunks = stream.try_chunks(chunk_size);
    futures::pin_mut!(chunks);

    let mut deleted = 0u64;
    while let Some(chunk) = chunks.next().await {
        let refs = chunk.map_err(|err| err.1)?;
        let count = refs.len() as u64;
        delete(refs).await?;
        deleted += count;
    }
    Ok(deleted)
}

impl KibanaStorage {
    async fn search_request(
        &self,
        body: Value,
        size: i64,
        filter_path: &[&str],
    ) -> Result<SearchResponse, Error> {
        let index = [self.config.index.as_str()];
        let doc_types = self.config.doc_type.as_deref().map(|doc_type| [doc_type]);
        let search = match &doc_types {
            Some(doc_types) => self
                .client
                .search(SearchParts::IndexType(&index, doc_types)),
            None => self.client.search(SearchParts::Index(&index)),
        };
        let response = search
            .size(size)
            .filter_path(filter_path)
            .request_timeout(self.config.timeout)
            .body(body)
            .send()
            .await
            .context(ElasticsearchClient {
                details: format!("cannot search index {}", self.config.index),
            })?;

        if response.status_code().is_success() {
            response
                .json::<SearchResponse>()
                .await
                .context(ElasticsearchDeserialization)
        } else {
            Err(exception_error(response).await)
        }
    }

    /// Number of documents matching the filter, as reported by
    /// `hits.total` on a single-hit search. Used to size the
    /// full-window queries.
    pub async fn count_documents(&self, filter: &QueryFilter) -> Result<u64, Error> {
        let response = self
            .search_request(filter.body(), 1, &["hits.total"])
            .await?;
        let total = response.hits.total.ok_or(Error::JsonInvalid {
            details: String::from("expected 'hits.total'"),
        })?;
        Ok(total.value())
    }

    /// Identifiers of the documents matching the filter, fetched with a
    /// single request sized by `count_documents`.
    ///
    /// Matches beyond that single-request window are not paginated: the
    /// result can be truncated on very large indices, though never
    /// longer than the reported count. Deletion goes through the
    /// scrolled path instead.
    pub async fn list_document_refs(
        &self,
        filter: &QueryFilter,
    ) -> Result<Vec<DocumentRef>, Error> {
        let size = self.count_documents(filter).await?;
        let response = self
            .search_request(
                filter.body(),
                size as i64,
                &["hits.hits._index", "hits.hits._type", "hits.hits._id"],
            )
            .await?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .map(DocumentRef::from)
            .collect())
    }

    /// Fetch the full documents for the given identifiers with one
    /// multi-get request, in request order. Identifiers that resolve to
    /// nothing are skipped with a warning.
    pub async fn get_documents(&self, refs: &[DocumentRef]) -> Result<Vec<SavedObject>, Error> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let docs = refs
            .iter()
            .map(|r| json!({ "_index": r.index, "_type": r.doc_type, "_id": r.id }))
            .collect::<Vec<_>>();
        let response = self
            .client
            .mget(MgetParts::None)
            .request_timeout(self.config.timeout)
            .body(json!({ "docs": docs }))
            .send()
            .await
            .context(ElasticsearchClient {
                details: format!("cannot multi-get from index {}", self.config.index),
            })?;

        if response.status_code().is_success() {
            let body = response
                .json::<MgetResponse>()
                .await
                .context(ElasticsearchDeserialization)?;
            Ok(body
                .docs
                .into_iter()
                .filter_map(|hit| {
                    let id = hit.id.clone();
                    let object = hit.into_saved_object();
                    if object.is_none() {
                        warn!("document '{}' not found, skipping", id);
                    }
                    object
                })
                .collect())
        } else {
            Err(exception_error(response).await)
        }
    }

    /// Fetch the full documents matching the filter with one search
    /// sized by `count_documents`. Same single-request-window truncation
    /// caveat as `list_document_refs`.
    pub async fn search_documents(&self, filter: &QueryFilter) -> Result<Vec<SavedObject>, Error> {
        let size = self.count_documents(filter).await?;
        let response = self
            .search_request(
                filter.body(),
                size as i64,
                &[
                    "hits.hits._index",
                    "hits.hits._type",
                    "hits.hits._id",
                    "hits.hits._source",
                ],
            )
            .await?;
        Ok(response
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let id = hit.id.clone();
                let object = hit.into_saved_object();
                if object.is_none() {
                    warn!("document '{}' has no source, skipping", id);
                }
                object
            })
            .collect())
    }

    /// Enumerate the identifiers of every document matching the filter
    /// through a scroll cursor, as delete candidates. Unlike the sized
    /// search paths, this enumerates all matches regardless of count;
    /// each call opens a fresh, finite cursor.
    pub async fn stream_deletable(
        &self,
        filter: &QueryFilter,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<DocumentRef, Error>> + Send>>, Error> {
        let client = self.client.clone();
        let index = self.config.index.clone();
        let doc_type = self.config.doc_type.clone();
        let timeout = self.config.timeout;
        let chunk_size = self.config.scroll_chunk_size as i64;
        let keep_alive = self.config.scroll_keep_alive.clone();

        // The cursor only carries identifiers: no source, no scoring.
        let mut query = filter.body();
        query["_source"] = json!(false);
        query["sort"] = json!(["_doc"]);

        let stream = stream::try_unfold(State::Start, move |state| {
            let client = client.clone();
            let index = index.clone();
            let doc_type = doc_type.clone();
            let keep_alive = keep_alive.clone();
            let query = query.clone();

            async move {
                match state {
                    State::Start => {
                        let indices = [index.as_str()];
                        let doc_types = doc_type.as_deref().map(|doc_type| [doc_type]);
                        let search = match &doc_types {
                            Some(doc_types) => {
                                client.search(SearchParts::IndexType(&indices, doc_types))
                            }
                            None => client.search(SearchParts::Index(&indices)),
                        };
                        let response = search
                            .scroll(&keep_alive)
                            .size(chunk_size)
                            .request_timeout(timeout)
                            .body(query)
                            .send()
                            .await
                            .context(ElasticsearchClient {
                                details: format!("cannot open scroll on index {}", index),
                            })?;

                        let body = scroll_page(response).await?;
                        next_chunk(body)
                    }
                    State::Next(scroll_id) => {
                        let response = client
                            .scroll(ScrollParts::None)
                            .request_timeout(timeout)
                            .body(json!({ "scroll": keep_alive, "scroll_id": scroll_id }))
                            .send()
                            .await
                            .context(ElasticsearchClient {
                                details: format!("cannot continue scroll on index {}", index),
                            })?;

                        let body = scroll_page(response).await?;
                        next_chunk(body)
                    }
                    State::End(scroll_id) => {
                        let response = client
                            .clear_scroll(ClearScrollParts::None)
                            .body(json!({ "scroll_id": [scroll_id] }))
                            .send()
                            .await
                            .context(ElasticsearchClient {
                                details: String::from("cannot clear scroll"),
                            })?;
                        if !response.status_code().is_success() {
                            // the cursor expires server-side anyway
                            warn!("could not clear scroll cursor on index {}", index);
                        }
                        Ok(None)
                    }
                }
            }
        })
        .try_flatten();

        Ok(stream.boxed())
    }

    /// Load the given saved objects into the configured index as one
    /// bulk of index operations, keyed by each record's type and id, so
    /// re-running the same load overwrites rather than duplicates.
    ///
    /// Success or failure is evaluated for the whole batch: a failing
    /// `errors` flag on the bulk response surfaces as a single error.
    pub async fn bulk_index(&self, documents: &[SavedObject]) -> Result<(), Error> {
        if documents.is_empty() {
            info!("no documents to load");
            return Ok(());
        }
        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
        for document in documents {
            // the destination index comes from the configuration, not
            // from the record
            body.push(
                json!({ "index": {
                    "_index": self.config.index,
                    "_type": document.doc_type,
                    "_id": document.id,
                }})
                .into(),
            );
            body.push(document.source.clone().into());
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .request_timeout(self.config.timeout)
            .body(body)
            .send()
            .await
            .context(ElasticsearchClient {
                details: format!("cannot bulk index into {}", self.config.index),
            })?;

        self.check_bulk_response(response).await
    }

    /// Delete every document matching the filter, piping the scrolled
    /// identifier stream into fixed-size bulk chunks so arbitrarily
    /// large result sets are never materialized at once. Returns the
    /// number of delete operations submitted.
    pub async fn bulk_delete(&self, filter: &QueryFilter) -> Result<u64, Error> {
        let stream = self.stream_deletable(filter).await?;
        delete_in_chunks(stream, self.config.bulk_chunk_size, |refs| async move {
            self.bulk_delete_refs(&refs).await
        })
        .await
    }

    async fn bulk_delete_refs(&self, refs: &[DocumentRef]) -> Result<(), Error> {
        if refs.is_empty() {
            return Ok(());
        }
        let body: Vec<JsonBody<Value>> = refs
            .iter()
            .map(|r| {
                json!({ "delete": {
                    "_index": r.index,
                    "_type": r.doc_type,
                    "_id": r.id,
                }})
                .into()
            })
            .collect();

        let response = self
            .client
            .bulk(BulkParts::None)
            .request_timeout(self.config.timeout)
            .body(body)
            .send()
            .await
            .context(ElasticsearchClient {
                details: format!("cannot bulk delete from {}", self.config.index),
            })?;

        self.check_bulk_response(response).await
    }

    async fn check_bulk_response(&self, response: Response) -> Result<(), Error> {
        if response.status_code().is_success() {
            let body = response
                .json::<BulkResponse>()
                .await
                .context(ElasticsearchDeserialization)?;
            if body.errors {
                let failed = body
                    .items
                    .iter()
                    .filter(|item| {
                        item.get("index")
                            .or_else(|| item.get("delete"))
                            .and_then(|op| op.get("error"))
                            .is_some()
                    })
                    .count();
                Err(Error::BulkFailure {
                    details: format!("{} operations out of {} failed", failed, body.items.len()),
                })
            } else {
                Ok(())
            }
        } else {
            Err(exception_error(response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(value: Value) -> SearchResponse {
        serde_json::from_value(value).expect("search response")
    }

    #[test]
    fn should_continue_scrolling_while_pages_have_hits() {
        let body = page(json!({
            "_scroll_id": "cursor-1",
            "hits": { "hits": [
                { "_index": ".kibana", "_type": "dashboard", "_id": "1" }
            ]}
        }));
        let (_, state) = next_chunk(body).unwrap().unwrap();
        assert!(matches!(state, State::Next(id) if id == "cursor-1"));
    }

    #[test]
    fn should_end_scrolling_on_an_empty_page() {
        let body = page(json!({ "_scroll_id": "cursor-2", "hits": { "hits": [] } }));
        let (_, state) = next_chunk(body).unwrap().unwrap();
        assert!(matches!(state, State::End(id) if id == "cursor-2"));
    }

    #[test]
    fn should_fail_when_the_scroll_id_is_missing() {
        let body = page(json!({ "hits": { "hits": [] } }));
        let err = next_chunk(body).unwrap_err();
        assert!(matches!(err, Error::ElasticsearchResponseMissingScrollId));
    }

    fn reference(id: u32) -> DocumentRef {
        DocumentRef {
            index: String::from(".kibana"),
            doc_type: String::from("dashboard"),
            id: format!("doc-{}", id),
        }
    }

    #[test]
    fn should_delete_every_match_exactly_once_beyond_one_chunk() {
        // more matches than one bulk chunk carries
        let candidates = (0..2500).map(|i| Ok(reference(i))).collect::<Vec<_>>();
        let batches = std::cell::RefCell::new(Vec::new());

        let deleted = futures::executor::block_on(delete_in_chunks(
            stream::iter(candidates),
            1000,
            |refs| {
                batches
                    .borrow_mut()
                    .push(refs.iter().map(|r| r.id.clone()).collect::<Vec<_>>());
                async { Ok(()) }
            },
        ))
        .unwrap();

        assert_eq!(deleted, 2500);
        let batches = batches.into_inner();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![1000, 1000, 500]
        );
        let all = batches.concat();
        let expected = (0..2500).map(|i| format!("doc-{}", i)).collect::<Vec<_>>();
        assert_eq!(all, expected);
    }

    #[test]
    fn should_stop_deleting_when_the_stream_fails() {
        let candidates = vec![
            Ok(reference(1)),
            Ok(reference(2)),
            Err(Error::ElasticsearchResponseMissingScrollId),
            Ok(reference(3)),
        ];
        let batches = std::cell::RefCell::new(Vec::new());

        let result = futures::executor::block_on(delete_in_chunks(
            stream::iter(candidates),
            2,
            |refs| {
                batches.borrow_mut().push(refs.len());
                async { Ok(()) }
            },
        ));

        assert!(matches!(
            result,
            Err(Error::ElasticsearchResponseMissingScrollId)
        ));
        // the complete chunk before the failure still went through
        assert_eq!(batches.into_inner(), vec![2]);
    }

    #[test]
    fn should_yield_identifier_records_without_score() {
        let body = page(json!({
            "_scroll_id": "cursor-3",
            "hits": { "hits": [
                { "_index": ".kibana", "_type": "search", "_id": "_search-1", "_score": null }
            ]}
        }));
        let (chunk, _) = next_chunk(body).unwrap().unwrap();
        let refs = futures::executor::block_on_stream(chunk)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, "_search-1");
        assert_eq!(refs[0].doc_type, "search");
        assert_eq!(
            serde_json::to_value(&refs[0]).unwrap(),
            json!({ "_index": ".kibana", "_type": "search", "_id": "_search-1" })
        );
    }
}
