use snafu::{ResultExt, Snafu};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use structopt::StructOpt;
use tracing::info;

use ctlkibana::filter::QueryFilter;
use ctlkibana::settings::{self, Command, Opts};
use ctlkibana::storage::remote::{self, Remote};
use ctlkibana::utils::{launch, logger};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Settings (Configuration or CLI) Error: {}", source))]
    Settings { source: settings::Error },

    #[snafu(display("Logger Error: {}", source))]
    Logger { source: logger::Error },

    #[snafu(display("Execution Error: {}", source))]
    Execution {
        #[snafu(source(false))]
        source: Box<dyn std::error::Error>,
    },
}

fn main() -> Result<(), Error> {
    let opts = Opts::from_args();
    let settings = settings::Settings::new(&opts).context(Settings)?;
    logger::logger_init().context(Logger)?;

    match opts.cmd {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&settings).unwrap());
            Ok(())
        }
        cmd => launch::launch_with_runtime(run(cmd, settings))
            .map_err(|source| Error::Execution { source }),
    }
}

async fn run(cmd: Command, settings: settings::Settings) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "connecting to elasticsearch at {}",
        settings.elasticsearch.url
    );
    let client = remote::connection_pool_url(&settings.elasticsearch.url)
        .conn(settings.elasticsearch)
        .await?;

    match cmd {
        Command::Import { filepath, .. } => {
            let count = client.import_dump(&filepath).await?;
            info!(
                "loaded {} saved objects from {}",
                count,
                filepath.display()
            );
        }
        Command::Export {
            outputfile, filter, ..
        } => {
            let filter = QueryFilter::from_name(filter.as_deref());
            let count = match outputfile {
                Some(path) => {
                    let mut writer = BufWriter::new(File::create(&path)?);
                    let count = client.export_dump(&mut writer, &filter).await?;
                    writer.flush()?;
                    info!("exported to {}", path.display());
                    count
                }
                None => {
                    let stdout = io::stdout();
                    let mut writer = stdout.lock();
                    let count = client.export_dump(&mut writer, &filter).await?;
                    writer.flush()?;
                    count
                }
            };
            info!("exported {} saved objects with filter '{}'", count, filter);
        }
        // resolved in main, before the runtime starts
        Command::Config => {}
    }

    Ok(())
}
