use snafu::{ResultExt, Snafu};
use tracing_log::LogTracer;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Could not init log tracer: {}", source))]
    InitLogTracer {
        source: tracing_log::log::SetLoggerError,
    },

    #[snafu(display("Could not set global default subscriber: {}", source))]
    SetGlobalDefault {
        source: tracing::subscriber::SetGlobalDefaultError,
    },
}

/// Set up tracing on stderr, filtered by RUST_LOG (default 'info'),
/// with log-crate records bridged in. Stdout stays free for exports.
pub fn logger_init() -> Result<(), Error> {
    LogTracer::init().context(InitLogTracer)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context(SetGlobalDefault)
}
