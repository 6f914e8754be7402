//! Command-line interface.
//!
//! Every option falls back to an environment variable, so the same `.env`
//! file configures the API server and the worker.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parkcast_core::city::City;
use parkcast_core::retry::RetryPolicy;
use parkcast_core::time::parse_timestamp;
use parkcast_core::training::DEFAULT_MIN_RECORDS_PER_GARAGE;
use parkcast_core::types::Timestamp;

use crate::error::FetchError;
use crate::fetcher::Fetcher;
use crate::jobs::DEFAULT_MATCH_TOLERANCE_MINUTES;

/// Parking occupancy batch worker
#[derive(Parser, Debug)]
#[command(name = "parkcast-worker")]
#[command(about = "Fetch, process and train on public parking occupancy feeds")]
#[command(version)]
pub struct Cli {
    /// Storage backend (`sqlite:` or `postgres:` URL)
    #[arg(long, env = "DATABASE_URL", default_value = parkcast_db::DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,

    /// Directory that receives trained model artifacts
    #[arg(long, env = "MODEL_DIR", default_value = "models", global = true)]
    pub model_dir: PathBuf,

    /// HTTP timeout for one feed request
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub fetch_timeout_secs: u64,

    /// Attempts per feed request before giving up
    #[arg(long, env = "FETCH_MAX_ATTEMPTS", default_value_t = 3, global = true)]
    pub fetch_max_attempts: u32,

    /// Override the Basel feed URL
    #[arg(long, env = "BASEL_API_URL", global = true)]
    pub basel_url: Option<String>,

    /// Override the Aarhus feed URL
    #[arg(long, env = "AARHUS_API_URL", global = true)]
    pub aarhus_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fetch current feeds into the raw store
    Fetch {
        /// Only this city (default: all)
        #[arg(long)]
        city: Option<City>,
    },

    /// Turn raw records into processed observations
    Process {
        #[arg(long)]
        city: Option<City>,

        /// Only raw records fetched at or after this time
        #[arg(long, value_parser = parse_since)]
        since: Option<Timestamp>,
    },

    /// Train a model and record its metadata
    Train {
        #[arg(long)]
        city: City,

        /// Train a single-garage model (name or source id)
        #[arg(long)]
        garage: Option<String>,

        /// Minimum history per garage
        #[arg(long, default_value_t = DEFAULT_MIN_RECORDS_PER_GARAGE)]
        min_records: usize,
    },

    /// Attach observed occupancy to past predictions
    Reconcile {
        #[arg(long)]
        city: Option<City>,

        /// Maximum distance between target time and observation
        #[arg(long, default_value_t = DEFAULT_MATCH_TOLERANCE_MINUTES)]
        tolerance_minutes: i64,
    },

    /// Run fetch, process, reconcile and train on a schedule
    Run {
        #[arg(long)]
        city: Option<City>,

        #[arg(long, env = "FETCH_INTERVAL_SECS", default_value_t = 900)]
        fetch_interval_secs: u64,

        #[arg(long, env = "TRAIN_INTERVAL_SECS", default_value_t = 86_400)]
        train_interval_secs: u64,
    },
}

impl Cli {
    /// HTTP fetcher configured from the global options.
    pub fn fetcher(&self) -> Result<Fetcher, FetchError> {
        let policy = RetryPolicy {
            max_attempts: self.fetch_max_attempts.max(1),
            ..RetryPolicy::default()
        };
        let mut fetcher = Fetcher::new(Duration::from_secs(self.fetch_timeout_secs), policy)?;
        if let Some(url) = &self.basel_url {
            fetcher = fetcher.with_url(City::Basel, url.clone());
        }
        if let Some(url) = &self.aarhus_url {
            fetcher = fetcher.with_url(City::Aarhus, url.clone());
        }
        Ok(fetcher)
    }
}

/// `city` alone, or every city.
pub fn cities(city: Option<City>) -> Vec<City> {
    match city {
        Some(city) => vec![city],
        None => City::ALL.to_vec(),
    }
}

fn parse_since(value: &str) -> Result<Timestamp, String> {
    parse_timestamp(value).ok_or_else(|| format!("cannot parse timestamp {value:?}"))
}
