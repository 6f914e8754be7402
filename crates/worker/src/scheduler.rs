//! Long-running job loop.
//!
//! Every fetch tick runs fetch, process and reconcile for each city; every
//! train tick retrains the city models. Failures are logged and the loop
//! carries on, so one bad feed never stops the other city or the next tick.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use parkcast_core::city::City;
use parkcast_core::types::Timestamp;
use parkcast_core::training::TrainingConfig;
use parkcast_db::{DbStore, ParkingStore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::fetcher::Fetcher;
use crate::jobs::{run_fetch, run_process, run_reconcile, run_train, DEFAULT_MATCH_TOLERANCE_MINUTES};

#[derive(Debug, Clone)]
pub struct Schedule {
    pub cities: Vec<City>,
    pub fetch_every: Duration,
    pub train_every: Duration,
    pub model_dir: PathBuf,
    pub training: TrainingConfig,
}

pub struct Scheduler {
    store: DbStore,
    fetcher: Fetcher,
    schedule: Schedule,
    /// Oldest fetch per city whose records have not been processed yet.
    unprocessed_since: HashMap<City, Timestamp>,
    /// Cities whose watermark has been restored from storage.
    resumed: HashSet<City>,
}

impl Scheduler {
    pub fn new(store: DbStore, fetcher: Fetcher, schedule: Schedule) -> Self {
        Self {
            store,
            fetcher,
            schedule,
            unprocessed_since: HashMap::new(),
            resumed: HashSet::new(),
        }
    }

    /// Oldest fetch of `city` still waiting to be processed, if known.
    pub fn unprocessed_since(&self, city: City) -> Option<Timestamp> {
        self.unprocessed_since.get(&city).copied()
    }

    /// Pick up raw records left unprocessed by an earlier run.
    ///
    /// Retried on every cycle until storage answers once.
    async fn resume(&mut self, city: City) {
        if self.resumed.contains(&city) {
            return;
        }
        match self.store.oldest_unprocessed_fetch(city.as_str()).await {
            Ok(oldest) => {
                if let Some(oldest) = oldest {
                    tracing::info!(city = %city, since = %oldest, "Resuming unprocessed raw records");
                    let since = self.unprocessed_since.entry(city).or_insert(oldest);
                    *since = (*since).min(oldest);
                }
                self.resumed.insert(city);
            }
            Err(e) => log_failure(city, "resume", &JobError::from(e)),
        }
    }

    /// Run until `cancel` is triggered.
    ///
    /// Fetching starts immediately; the first training run waits one full
    /// training interval.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            cities = ?self.schedule.cities,
            fetch_secs = self.schedule.fetch_every.as_secs(),
            train_secs = self.schedule.train_every.as_secs(),
            "Scheduler started",
        );

        let mut fetch = tokio::time::interval(self.schedule.fetch_every);
        fetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut train = tokio::time::interval_at(
            Instant::now() + self.schedule.train_every,
            self.schedule.train_every,
        );
        train.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopping");
                    break;
                }
                _ = fetch.tick() => {
                    for city in self.schedule.cities.clone() {
                        self.ingest_cycle(city).await;
                    }
                }
                _ = train.tick() => {
                    for city in self.schedule.cities.clone() {
                        self.train_cycle(city).await;
                    }
                }
            }
        }
    }

    /// Fetch, process everything not yet processed, then reconcile.
    pub async fn ingest_cycle(&mut self, city: City) {
        self.resume(city).await;
        let store = self.store.as_ref();

        match run_fetch(store, &self.fetcher, city).await {
            Ok(report) => {
                self.unprocessed_since
                    .entry(city)
                    .or_insert(report.fetched_at);
            }
            Err(e) => log_failure(city, "fetch", &e),
        }

        if let Some(since) = self.unprocessed_since.get(&city).copied() {
            match run_process(store, city, Some(since)).await {
                Ok(_) => {
                    self.unprocessed_since.remove(&city);
                }
                Err(e) => log_failure(city, "process", &e),
            }
        }

        let tolerance = chrono::Duration::minutes(DEFAULT_MATCH_TOLERANCE_MINUTES);
        if let Err(e) = run_reconcile(store, city, Utc::now(), tolerance).await {
            log_failure(city, "reconcile", &e);
        }
    }

    pub async fn train_cycle(&self, city: City) {
        let result = run_train(
            self.store.as_ref(),
            city,
            None,
            &self.schedule.model_dir,
            &self.schedule.training,
            Utc::now(),
        )
        .await;
        if let Err(e) = result {
            log_failure(city, "train", &e);
        }
    }
}

fn log_failure(city: City, job: &str, err: &JobError) {
    if err.is_transient() {
        tracing::warn!(city = %city, job, error = %err, "Job failed, will retry next tick");
    } else {
        tracing::error!(city = %city, job, error = %err, "Job failed");
    }
}
