use std::borrow::Cow;
use std::{fs, path::Path};

use advisory_db::{cve_sources::nvd, db, ingest};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use env_logger::Env;

mod api;
mod configuration;

use crate::api::ApiConfig;
use crate::configuration::{ApiSettings, DatabaseSettings, NvdSettings};

#[actix_web::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();

    dotenv().ok();

    // Repository
    let repository = {
        let db_settings = DatabaseSettings::try_from_env()?;
        ensure_db_dir(&db_settings.path);

        db::SqliteRepository::new(&db_settings.path).context("Cannot open database")?
    };

    // Setup logger
    {
        #[cfg(debug_assertions)]
        let default_env_filter = "debug";
        #[cfg(not(debug_assertions))]
        let default_env_filter = "info";

        if opts.cmd.is_none() {
            // Init tracer for web application
            api::init_logger(default_env_filter)
        } else {
            // Init logger for non web application
            let env = Env::default().default_filter_or(default_env_filter);
            env_logger::Builder::from_env(env).try_init()
        }
        .context("Failed to setup logger")?;
    }

    // Schema creation is idempotent; run it on every start
    repository.setup_database().context("Cannot create schema")?;

    match opts.cmd {
        Some(Commands::Fetch { data_dir, window }) => {
            let data_path = check_data_path(&data_dir);
            let api_key = NvdSettings::try_from_env()?.api_key;

            let end = Utc::now();
            let start = end - Duration::days(window);

            let saved = nvd::fetch_window(data_path, start, end, api_key.as_deref())?;

            log::info!("saved {} raw batches to {}", saved.len(), data_path.display());
        }
        Some(Commands::Import { data_dir }) => {
            let data_path = check_data_path(&data_dir);

            let report = ingest::ingest_dir(&repository, data_path)?;

            log::info!("{}", report_message(&report));
        }
        None => {
            let ApiSettings { address, port } = ApiSettings::try_from_env()?;

            log::info!("Start listening on {}:{}...", address, port);

            let api_config = ApiConfig {
                address,
                port,
                repository,
            };

            api::run(api_config)?.await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
#[command(disable_help_subcommand = true)]
struct Opts {
    #[command(subcommand)]
    cmd: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetches raw advisory pages modified in the given window from the NVD API
    #[command(name = "fetch")]
    Fetch {
        /// Raw data path
        #[arg(short = 'd', long = "data", default_value_t = String::from("./data/raw"))]
        data_dir: String,

        /// Size of the lastModified window, in days
        #[arg(short = 'w', long = "window", default_value_t = 7)]
        window: i64,
    },

    /// Normalizes every pending raw batch into the store
    #[command(name = "import")]
    Import {
        /// Raw data path
        #[arg(short = 'd', long = "data", default_value_t = String::from("./data/raw"))]
        data_dir: String,
    },
}

/// Handle data directory creation if not existing
fn check_data_path(data_path: &str) -> &Path {
    let data_path = Path::new(data_path);
    if !data_path.exists() {
        log::info!("creating {}", data_path.display());
        fs::create_dir_all(data_path).expect("could not create data path");
    }
    data_path
}

fn ensure_db_dir(db_path: &str) {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).expect("could not create database directory");
        }
    }
}

fn report_message(report: &ingest::IngestReport) -> Cow<'static, str> {
    if report == &ingest::IngestReport::default() {
        Cow::Borrowed("No pending batches processed")
    } else {
        Cow::Owned(report.to_string())
    }
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
