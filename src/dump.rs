//! Reading and writing saved-object dump files.
//!
//! A dump is a JSON array of records shaped like
//! `{"_index": ..., "_type": ..., "_id": ..., "_source": {...}}`,
//! written with 2-space indentation, lexicographically sorted keys and a
//! trailing newline.

use snafu::{ResultExt, Snafu};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::document::SavedObject;
use crate::filter::QueryFilter;
use crate::storage::{self, KibanaStorage};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Could not read dump file {}: {}", path.display(), source))]
    DumpRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid dump file {}: {}", path.display(), source))]
    DumpParsing {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("Could not serialize dump: {}", source))]
    DumpSerialization { source: serde_json::Error },

    #[snafu(display("Could not write dump: {}", source))]
    DumpWrite { source: std::io::Error },

    #[snafu(display("Storage Error: {}", source))]
    Storage { source: storage::Error },
}

/// Parse the content of a dump file. Each record must carry `_type`,
/// `_id` and `_source`; a record missing one of them fails the whole
/// parse with an error naming the field.
pub fn parse_documents(content: &str) -> Result<Vec<SavedObject>, serde_json::Error> {
    serde_json::from_str(content)
}

/// Write a batch of saved objects in the dump format to the given
/// writer.
pub fn write_documents<W: Write>(writer: &mut W, documents: &[SavedObject]) -> Result<(), Error> {
    serde_json::to_writer_pretty(&mut *writer, documents).map_err(|source| {
        // serde_json wraps writer failures; report those as write errors
        if source.classify() == serde_json::error::Category::Io {
            Error::DumpWrite {
                source: source.into(),
            }
        } else {
            Error::DumpSerialization { source }
        }
    })?;
    writer.write_all(b"\n").context(DumpWrite)?;
    Ok(())
}

impl KibanaStorage {
    /// Read a dump file, parse it fully into memory, and bulk-load its
    /// records into the configured index. Returns the number of records
    /// loaded.
    pub async fn import_dump(&self, path: &Path) -> Result<usize, Error> {
        let content = std::fs::read_to_string(path).context(DumpRead { path })?;
        let documents = parse_documents(&content).context(DumpParsing { path })?;
        info!(
            "loading {} saved objects into index {}",
            documents.len(),
            self.config.index
        );
        self.bulk_index(&documents).await.context(Storage)?;
        Ok(documents.len())
    }

    /// Export every document matching the filter to the given writer as
    /// a dump. Returns the number of records written.
    pub async fn export_dump<W: Write>(
        &self,
        writer: &mut W,
        filter: &QueryFilter,
    ) -> Result<usize, Error> {
        let documents = self.search_documents(filter).await.context(Storage)?;
        write_documents(writer, &documents)?;
        Ok(documents.len())
    }
}
