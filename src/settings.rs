//! Command line arguments and configuration for ctlkibana.

use config::builder::{ConfigBuilder, DefaultState};
use config::Config;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::path::PathBuf;
use structopt::StructOpt;

use crate::storage::KibanaStorageConfig;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Config Merge Error: {} [{}]", msg, source))]
    ConfigMerge {
        msg: String,
        source: config::ConfigError,
    },

    #[snafu(display("Invalid Setting Override: {}", msg))]
    InvalidOverride { msg: String },
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Settings {
    pub elasticsearch: KibanaStorageConfig,
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ctlkibana",
    about = "Import and export Kibana saved objects stored in Elasticsearch",
    version = VERSION
)]
pub struct Opts {
    /// Override settings values using key=value
    #[structopt(short = "s", long = "setting", number_of_values = 1)]
    pub settings: Vec<String>,

    #[structopt(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Load a JSON dump of saved objects into the Kibana metadata index
    Import {
        /// URL of the Elasticsearch endpoint
        url: String,

        /// JSON file in Kibana format to be loaded
        #[structopt(parse(from_os_str))]
        filepath: PathBuf,
    },
    /// Export saved objects from the Kibana metadata index as a JSON dump
    Export {
        /// URL of the Elasticsearch endpoint
        url: String,

        /// JSON file where to export Kibana elements, stdout when omitted
        #[structopt(parse(from_os_str))]
        outputfile: Option<PathBuf>,

        /// Document type. Available ones from Kibana are: 'dashboard',
        /// 'visualization', 'search' and 'index-pattern'
        #[structopt(short = "t", long = "doc-type")]
        doc_type: Option<String>,

        /// Filter to export. Available ones are: 'client', 'filtered'
        /// and 'all'
        #[structopt(short = "f", long = "filter")]
        filter: Option<String>,
    },
    /// Prints ctlkibana's configuration
    Config,
}

impl Settings {
    /// Resolve the settings from defaults, CTLKIBANA-prefixed
    /// environment variables, the subcommand's arguments and the
    /// key=value overrides, in that order.
    pub fn new(opts: &Opts) -> Result<Self, Error> {
        let mut builder = Config::builder()
            .set_default("elasticsearch.url", "http://localhost:9200")
            .context(ConfigMerge {
                msg: "elasticsearch.url",
            })?
            .set_default("elasticsearch.index", ".kibana")
            .context(ConfigMerge {
                msg: "elasticsearch.index",
            })?
            .set_default("elasticsearch.timeout", 10_000_i64)
            .context(ConfigMerge {
                msg: "elasticsearch.timeout",
            })?
            .set_default("elasticsearch.scroll_keep_alive", "1m")
            .context(ConfigMerge {
                msg: "elasticsearch.scroll_keep_alive",
            })?
            .set_default("elasticsearch.scroll_chunk_size", 1000_i64)
            .context(ConfigMerge {
                msg: "elasticsearch.scroll_chunk_size",
            })?
            .set_default("elasticsearch.bulk_chunk_size", 1000_i64)
            .context(ConfigMerge {
                msg: "elasticsearch.bulk_chunk_size",
            })?;

        builder =
            builder.add_source(config::Environment::with_prefix("CTLKIBANA").separator("__"));

        match &opts.cmd {
            Command::Import { url, .. } => {
                builder = builder
                    .set_override("elasticsearch.url", url.as_str())
                    .context(ConfigMerge {
                        msg: "elasticsearch.url",
                    })?;
            }
            Command::Export { url, doc_type, .. } => {
                builder = builder
                    .set_override("elasticsearch.url", url.as_str())
                    .context(ConfigMerge {
                        msg: "elasticsearch.url",
                    })?;
                if let Some(doc_type) = doc_type {
                    builder = builder
                        .set_override("elasticsearch.doc_type", doc_type.as_str())
                        .context(ConfigMerge {
                            msg: "elasticsearch.doc_type",
                        })?;
                }
            }
            Command::Config => {}
        }

        builder = overrides_from_args(builder, &opts.settings)?;

        let config = builder.build().context(ConfigMerge {
            msg: String::from("cannot build the configuration from sources"),
        })?;

        config.try_deserialize().context(ConfigMerge {
            msg: String::from("cannot convert configuration into ctlkibana settings"),
        })
    }
}

/// Apply a list of 'key=value' assignments on top of the configuration.
/// Values that look like a bool, an integer or a float are parsed as
/// such, anything else stays a string.
fn overrides_from_args(
    mut builder: ConfigBuilder<DefaultState>,
    args: &[String],
) -> Result<ConfigBuilder<DefaultState>, Error> {
    for arg in args {
        let (key, val) = arg.split_once('=').ok_or_else(|| Error::InvalidOverride {
            msg: format!("missing '=' in setting override: {}", arg),
        })?;

        builder = {
            if let Ok(as_bool) = val.parse::<bool>() {
                builder.set_override(key, as_bool)
            } else if let Ok(as_int) = val.parse::<i64>() {
                builder.set_override(key, as_int)
            } else if let Ok(as_float) = val.parse::<f64>() {
                builder.set_override(key, as_float)
            } else {
                builder.set_override(key, val)
            }
        }
        .context(ConfigMerge {
            msg: format!("setting override {}", arg),
        })?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn opts(args: &[&str]) -> Opts {
        Opts::from_iter(args)
    }

    #[test]
    fn should_resolve_default_settings() {
        let settings = Settings::new(&opts(&["ctlkibana", "config"])).unwrap();
        assert_eq!(settings.elasticsearch.url.as_str(), "http://localhost:9200/");
        assert_eq!(settings.elasticsearch.index, ".kibana");
        assert_eq!(settings.elasticsearch.doc_type, None);
        assert_eq!(settings.elasticsearch.timeout, Duration::from_secs(10));
        assert_eq!(settings.elasticsearch.scroll_keep_alive, "1m");
        assert_eq!(settings.elasticsearch.scroll_chunk_size, 1000);
        assert_eq!(settings.elasticsearch.bulk_chunk_size, 1000);
    }

    #[test]
    fn should_take_the_url_from_the_subcommand() {
        let settings = Settings::new(&opts(&[
            "ctlkibana",
            "export",
            "http://elastic.example.com:9200",
        ]))
        .unwrap();
        assert_eq!(
            settings.elasticsearch.url.as_str(),
            "http://elastic.example.com:9200/"
        );
    }

    #[test]
    fn should_restrict_the_doc_type_on_export() {
        let settings = Settings::new(&opts(&[
            "ctlkibana",
            "export",
            "http://localhost:9200",
            "-t",
            "visualization",
        ]))
        .unwrap();
        assert_eq!(
            settings.elasticsearch.doc_type.as_deref(),
            Some("visualization")
        );
    }

    #[test]
    fn should_apply_setting_overrides() {
        let settings = Settings::new(&opts(&[
            "ctlkibana",
            "-s",
            "elasticsearch.bulk_chunk_size=500",
            "-s",
            "elasticsearch.index=.kibana-backup",
            "config",
        ]))
        .unwrap();
        assert_eq!(settings.elasticsearch.bulk_chunk_size, 500);
        assert_eq!(settings.elasticsearch.index, ".kibana-backup");
    }

    #[test]
    fn should_keep_the_subcommand_after_a_setting_override() {
        // one value per -s occurrence: the token after the value is the
        // subcommand, not another override
        let opts = Opts::from_iter_safe(&["ctlkibana", "-s", "elasticsearch.index=.kibana-6", "config"])
            .unwrap();
        assert_eq!(opts.settings, vec!["elasticsearch.index=.kibana-6"]);
        assert!(matches!(opts.cmd, Command::Config));
    }

    #[test]
    fn should_reject_malformed_setting_overrides() {
        let result = Settings::new(&opts(&["ctlkibana", "-s", "nonsense", "config"]));
        assert!(matches!(result, Err(Error::InvalidOverride { .. })));
    }
}
