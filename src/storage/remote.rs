use async_trait::async_trait;
use elasticsearch::http::transport::{
    BuildError as TransportBuilderError, SingleNodeConnectionPool, TransportBuilder,
};
use elasticsearch::Elasticsearch;
use snafu::{ResultExt, Snafu};
use url::Url;

use super::{KibanaStorage, KibanaStorageConfig};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Elasticsearch Transport Build Error
    #[snafu(display("Elasticsearch Connection Error: {}", source))]
    ElasticsearchConnection { source: TransportBuilderError },
}

#[async_trait]
pub trait Remote {
    type Conn;
    async fn conn(self, config: KibanaStorageConfig) -> Result<Self::Conn, Error>;
}

#[async_trait]
impl Remote for SingleNodeConnectionPool {
    type Conn = KibanaStorage;

    /// Use the connection pool to create a storage client.
    async fn conn(self, config: KibanaStorageConfig) -> Result<Self::Conn, Error> {
        let transport = TransportBuilder::new(self)
            .disable_proxy()
            .build()
            .context(ElasticsearchConnection)?;
        Ok(KibanaStorage {
            client: Elasticsearch::new(transport),
            config,
        })
    }
}

/// Open a connection pool to the elasticsearch endpoint.
pub fn connection_pool_url(url: &Url) -> SingleNodeConnectionPool {
    SingleNodeConnectionPool::new(url.clone())
}
