mod commands;
mod state;

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing::level_filters::LevelFilter;
use vswitch_compose_schemas::cli_models::{Opts, SubCommand};
use vswitch_compose_schemas::switch_yaml::Config;
use crate::commands::Session;


#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    std::process::exit(match run_app().await {
        Ok(_) => 0,
        Err(err) => {
            tracing::error!("{:#}", err);
            1
        }
    });
}

fn log_level(s: &str) -> anyhow::Result<LevelFilter> {
    match s.to_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(anyhow!("Unknown Log LevelFilter {}", s)),
    }
}

/// Parses the CLI arguments, sets up logging and runs the chosen command against the
/// switches declared in the input file.
pub async fn run_app() -> Result<(), anyhow::Error> {
    let opts: Opts = Opts::parse();
    let mut e = None;
    let level = match &opts.verbosity {
        None => LevelFilter::INFO,
        Some(x) => match log_level(x) {
            Ok(l) => l,
            Err(err) => {
                e = Some(err);
                LevelFilter::INFO
            }
        },
    };

    let stdout_log = tracing_subscriber::fmt::layer();
    tracing_subscriber::registry()
        .with(stdout_log.with_filter(level))
        .init();
    if let Some(e) = e {
        tracing::warn!("{}", e);
    }

    let name = opts.sub_command.name();
    if let Err(err) = parse_command(opts).await {
        tracing::error!("ERROR: {}", err);
        err.chain().skip(1).for_each(|cause| tracing::error!("because: {}", cause));
        bail!("{name} failed");
    }
    Ok(())
}

/// This is the entrypoint for all commands
pub async fn parse_command(opts: Opts) -> anyhow::Result<()> {
    // down and show only need the state file
    match &opts.sub_command {
        SubCommand::Down => {
            let mut session = Session::open(&opts).await?;
            return commands::down(&mut session).await.context("running down");
        }
        SubCommand::Show => {
            let session = Session::open(&opts).await?;
            return commands::show(&session).await.context("running show");
        }
        _ => {}
    }

    tracing::trace!("input = {:?}", opts.input);
    let config = Config::load_from_file(&opts.input).await
        .with_context(|| format!("loading {}", opts.input))?;
    if config.switches.is_empty() {
        tracing::warn!("no switches declared in {}", opts.input);
    }

    let result = match &opts.sub_command {
        SubCommand::Validate => commands::validate_config(&config).await,
        SubCommand::Plan => {
            let session = Session::open(&opts).await?;
            commands::plan(&session, &config).await
        }
        SubCommand::Up => {
            let mut session = Session::open(&opts).await?;
            commands::up(&mut session, &config).await
        }
        _ => bail!("command not matched, please raise an issue"),
    };
    result.with_context(|| format!("running {}", opts.sub_command.name()))
}
