use std::{
    fs::{File, OpenOptions},
    io::Read,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use color_eyre::eyre::Context;
use directories::ProjectDirs;
use humantime_serde::re::humantime;
use serde::{Deserialize, Serialize};
use sevenfuel::{Config, ConfigError, PriceLogger};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(clap::Parser, Debug)]
struct Args {
    #[arg(
        short,
        long,
        help = "Configuration file. Defaults to config.toml in the user configuration directory",
        global = true
    )]
    config: Option<PathBuf>,
    #[arg(
        short = 'u',
        long = "url",
        env = "SEVENFUEL_URL",
        help = "Root of the store locator API",
        global = true
    )]
    base_url: Option<String>,
    #[arg(
        short,
        long = "store",
        env = "SEVENFUEL_STORE",
        help = "Store number. Defaults to 1259 (Chadstone)",
        global = true
    )]
    store_id: Option<String>,
    #[arg(
        short = 'i',
        long = "index",
        env = "SEVENFUEL_INDEX",
        help = "Position of the fuel grade in the feed. Defaults to 5 (E95)",
        global = true
    )]
    grade_index: Option<usize>,
    #[arg(
        short,
        long,
        env = "SEVENFUEL_OUTPUT",
        help = "CSV file the prices are appended to. Defaults to fuel_prices.csv",
        global = true
    )]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and log the price once
    Log,
    /// Fetch and log the price periodically, until interrupted
    Watch(Watch),
}

#[derive(clap::Args, Debug)]
struct Watch {
    #[arg(
        short = 'p',
        long,
        value_parser = humantime::parse_duration,
        help = "Time between two polls, like '30m' or '1h'. Defaults to 1h"
    )]
    interval: Option<Duration>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    store_id: Option<String>,
    grade_index: Option<usize>,
    output_path: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    poll_interval: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    request_timeout: Option<Duration>,
    grade_label: Option<String>,
    store_label: Option<String>,
}

fn config_file(project: &ProjectDirs) -> color_eyre::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .read(true)
        .open(project.config_dir().join("config.toml"))
        .wrap_err("could not open config file")
}

fn load_config_file(path: Option<&Path>) -> color_eyre::Result<FileConfig> {
    let mut file = match path {
        Some(path) => File::open(path)
            .wrap_err_with(|| format!("could not open config file {}", path.display()))?,
        None => match ProjectDirs::from("au", "sevenfuel", "sevenfuel") {
            None => return Ok(FileConfig::default()),
            Some(p) => {
                std::fs::create_dir_all(p.config_dir())
                    .wrap_err("could not create config directory")?;
                config_file(&p)?
            }
        },
    };

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    toml::from_str(&config).wrap_err("could not parse config file")
}

/// Command line arguments take precedence over the config file, which takes precedence over the
/// defaults.
fn build_config(args: &Args, file: FileConfig) -> Result<Config, ConfigError> {
    let mut builder = Config::builder();

    if let Some(base_url) = args.base_url.clone().or(file.base_url) {
        builder = builder.base_url(base_url);
    }
    if let Some(store_id) = args.store_id.clone().or(file.store_id) {
        builder = builder.store_id(store_id);
    }
    if let Some(index) = args.grade_index.or(file.grade_index) {
        builder = builder.grade_index(index);
    }
    if let Some(output) = args.output.clone().or(file.output_path) {
        builder = builder.output_path(output);
    }

    let interval = match &args.command {
        Command::Watch(w) => w.interval,
        Command::Log => None,
    };
    if let Some(interval) = interval.or(file.poll_interval) {
        builder = builder.poll_interval(interval);
    }

    if let Some(grade_label) = file.grade_label {
        builder = builder.grade_label(grade_label);
    }
    if let Some(store_label) = file.store_label {
        builder = builder.store_label(store_label);
    }

    builder.request_timeout(file.request_timeout).build()
}

async fn shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupted, stopping"),
        Err(e) => {
            tracing::error!("Could not listen for Ctrl-C, polling until killed: {e}");
            std::future::pending().await
        }
    }
}

impl Command {
    async fn main(self, config: Config) -> color_eyre::Result<()> {
        let logger = PriceLogger::new(config).wrap_err("could not create HTTP client")?;

        match self {
            Command::Log => {
                let cycle = logger.fetch_and_log().await;
                println!("{}", cycle.console_line(logger.config()));
            }
            Command::Watch(_) => {
                tracing::info!(
                    "Polling {} every {}",
                    logger.feed_url(),
                    humantime::format_duration(logger.config().poll_interval())
                );

                let mut failures = 0usize;
                logger
                    .watch(shutdown(), |cycle| {
                        if !cycle.is_logged() {
                            failures += 1;
                        }
                        println!("{}", cycle.console_line(logger.config()));
                    })
                    .await;

                if failures > 0 {
                    tracing::warn!("{failures} poll cycles failed");
                }
            }
        }

        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let file = load_config_file(args.config.as_deref())?;
    let config = build_config(&args, file).wrap_err("invalid configuration")?;

    args.command.main(config).await
}
