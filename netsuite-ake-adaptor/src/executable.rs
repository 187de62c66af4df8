//! Main entry point for the command line.

use std::env;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::adaptor::NetSuiteAkeAdaptor;
use crate::composer::DataViewParameters;
use crate::composer::FilterClause;
use crate::configuration::Configuration;
use crate::configuration::generate_config_schema;

/// Options for the adaptor
#[derive(Parser, Debug)]
#[command(
    name = "netsuite-ake-adaptor",
    about = "Fetches NetSuite data views through the AKE GraphQL function"
)]
pub(crate) struct Opt {
    /// Log level (off|error|warn|info|debug|trace).
    #[arg(
        long = "log",
        default_value = "info",
        alias = "log-level",
        env = "NETSUITE_AKE_ADAPTOR_LOG"
    )]
    log_level: String,

    /// Configuration location relative to the current directory.
    #[arg(short, long = "config", env = "NETSUITE_AKE_ADAPTOR_CONFIG_PATH")]
    config_path: Option<PathBuf>,

    /// Prints the configuration schema.
    #[arg(long)]
    schema: bool,

    /// Prints the names of the configured data views.
    #[arg(long)]
    list: bool,

    /// The data view to fetch.
    view: Option<String>,

    /// A predicate applied to the data view, e.g. "region = 'APAC'". Repeat to AND several.
    #[arg(long = "filter", value_name = "ATTRIBUTE OPERATOR VALUE")]
    filters: Vec<FilterClause>,

    /// Maximum number of rows to fetch.
    #[arg(long)]
    limit: Option<u64>,

    /// Number of rows to skip.
    #[arg(long)]
    offset: Option<u64>,
}

/// This is the main adaptor entrypoint.
///
/// It parses the command line, loads the configuration and prints the
/// requested data view as json on stdout. Logs go to stderr.
pub fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(start(Opt::parse()))
}

async fn start(opt: Opt) -> Result<()> {
    if opt.schema {
        let schema = generate_config_schema();
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let env_filter = env::var("RUST_LOG").ok().unwrap_or(opt.log_level);
    let builder = tracing_subscriber::fmt::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_new(&env_filter).context("could not parse log")?);
    if std::io::stderr().is_terminal() {
        builder.init();
    } else {
        builder.json().init();
    }

    let Some(config_path) = opt.config_path else {
        bail!(
            "a configuration file is required, use '--config' or NETSUITE_AKE_ADAPTOR_CONFIG_PATH"
        );
    };
    let config_path = if config_path.is_relative() {
        env::current_dir()?.join(config_path)
    } else {
        config_path
    };
    let configuration = Configuration::from_file(&config_path)
        .with_context(|| format!("could not load {}", config_path.display()))?;

    if opt.list {
        for data_view in &configuration.data_views {
            println!("{}", data_view.name);
        }
        return Ok(());
    }

    let Some(view) = opt.view else {
        bail!("a data view name is required, use '--list' to print the configured ones");
    };
    let parameters = DataViewParameters {
        filters: opt.filters,
        limit: opt.limit,
        offset: opt.offset,
    };

    let adaptor = NetSuiteAkeAdaptor::new(configuration)
        .await
        .context("could not create the adaptor")?;
    match adaptor
        .get_data_view(&view, parameters)
        .await
        .with_context(|| format!("could not fetch data view '{view}'"))?
    {
        Some(envelope) => {
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
        None => bail!("no data view named '{view}'"),
    }
}
