//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates:
//! - Creating or resuming a run and its persisted frontier
//! - A continuously-fed pool of workers, each owning its own fetcher session
//!   and database connection
//! - Folding every prefix result through the expansion policy
//! - Graceful shutdown: no new dispatches, in-flight prefixes finish
//!
//! The coordinator is the only owner of the frontier. Workers never see it;
//! they receive one prefix at a time over their own channel and report back
//! over a shared event channel.

use crate::config::Config;
use crate::crawler::drain::{drain_prefix, DrainSettings};
use crate::crawler::expansion::ExpansionPolicy;
use crate::crawler::fetcher::FetcherFactory;
use crate::crawler::frontier::Frontier;
use crate::crawler::PrefixResult;
use crate::output::CrawlReport;
use crate::prefix::{seed, Alphabet, Prefix};
use crate::state::PrefixState;
use crate::storage::{open_storage, FrontierEntry, RunStatus, SqliteStorage, Storage};
use crate::SweepError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Message from a worker back to the coordinator
#[derive(Debug)]
enum WorkerEvent {
    /// The prefix was drained (successfully or not)
    Finished(PrefixResult),

    /// The drain broke a navigation invariant
    Fatal {
        worker_id: u32,
        prefix: Prefix,
        error: SweepError,
    },
}

/// One pool member
///
/// Owns its fetcher session and database connection between prefixes and
/// rebuilds both after a drain panics.
struct Worker<F: FetcherFactory> {
    id: u32,
    factory: Arc<F>,
    settings: Arc<DrainSettings>,
    database: PathBuf,
    busy_timeout: Duration,
    generation: u32,
}

type Session<F> = (<F as FetcherFactory>::Fetcher, SqliteStorage);

impl<F: FetcherFactory> Worker<F> {
    fn open_session(&self) -> Result<Session<F>, SweepError> {
        let fetcher = self.factory.create(self.id, self.generation)?;
        let store = SqliteStorage::new(&self.database, self.busy_timeout)?;
        Ok((fetcher, store))
    }

    async fn run(
        mut self,
        mut jobs: mpsc::Receiver<Prefix>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) {
        let mut session: Option<Session<F>> = None;

        while let Some(prefix) = jobs.recv().await {
            let current = match session.take() {
                Some(current) => current,
                None => match self.open_session() {
                    Ok(current) => current,
                    Err(e) => {
                        tracing::error!("[worker {}] Session setup failed: {}", self.id, e);
                        let result = PrefixResult::failed(
                            prefix,
                            self.id,
                            format!("session setup failed: {}", e),
                        );
                        if events.send(WorkerEvent::Finished(result)).is_err() {
                            break;
                        }
                        continue;
                    }
                },
            };

            let event = self.drain(prefix, current, &mut session).await;
            if events.send(event).is_err() {
                break;
            }
        }

        tracing::debug!("[worker {}] Stopped", self.id);
    }

    /// Drains one prefix on a separate task so a panic cannot take the worker down
    async fn drain(
        &mut self,
        prefix: Prefix,
        current: Session<F>,
        session: &mut Option<Session<F>>,
    ) -> WorkerEvent {
        let (mut fetcher, mut store) = current;
        let settings = Arc::clone(&self.settings);
        let worker_id = self.id;
        let task_prefix = prefix.clone();

        let task = tokio::spawn(async move {
            let outcome =
                drain_prefix(&mut fetcher, &mut store, &task_prefix, worker_id, &settings).await;
            (fetcher, store, outcome)
        });

        match task.await {
            Ok((fetcher, store, outcome)) => {
                *session = Some((fetcher, store));
                match outcome {
                    Ok(result) => WorkerEvent::Finished(result),
                    Err(error) => WorkerEvent::Fatal {
                        worker_id,
                        prefix,
                        error,
                    },
                }
            }
            Err(join_error) => {
                // The session died with the task; the next prefix gets a fresh one
                self.generation += 1;
                tracing::error!(
                    "[worker {}] Drain of '{}' crashed: {}",
                    worker_id,
                    prefix,
                    join_error
                );
                WorkerEvent::Finished(PrefixResult::failed(
                    prefix,
                    worker_id,
                    format!("worker crashed: {}", join_error),
                ))
            }
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator<F: FetcherFactory> {
    config: Arc<Config>,
    factory: Arc<F>,
    storage: SqliteStorage,
    frontier: Frontier,
    policy: ExpansionPolicy,
    settings: Arc<DrainSettings>,
    run_id: i64,
    resumed: bool,
    shutdown: CancellationToken,
}

impl<F: FetcherFactory> Coordinator<F> {
    /// Creates a coordinator, resuming the latest run when possible
    ///
    /// A run is resumed when it stopped before its frontier was exhausted, was
    /// started with the same configuration, and `fresh` is false.
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `factory` - Builds one fetcher session per worker
    /// * `config_hash` - Hash of the configuration file
    /// * `fresh` - Ignore earlier runs and seed a new frontier
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(SweepError)` - Failed to initialize
    pub fn new(
        config: Config,
        factory: F,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, SweepError> {
        let mut storage = open_storage(
            &PathBuf::from(&config.output.database_path),
            config.output.busy_timeout(),
        )?;
        let alphabet = config.alphabet()?;
        let policy = ExpansionPolicy::from_config(&config)?;

        let previous = if fresh {
            None
        } else {
            storage
                .get_latest_run()?
                .filter(|run| run.status.is_resumable())
        };

        let resumed = match previous {
            Some(run) if run.config_hash == config_hash => {
                let entries = storage.load_frontier(run.id)?;
                if entries.is_empty() {
                    None
                } else {
                    let frontier = restore_frontier(entries, &alphabet)?;
                    storage.update_run_status(run.id, RunStatus::Running)?;
                    tracing::info!(
                        "Resuming run {}: {} prefixes seen, {} to dispatch",
                        run.id,
                        frontier.seen_count(),
                        frontier.queued_count()
                    );
                    Some((run.id, frontier))
                }
            }
            Some(run) => {
                tracing::warn!(
                    "Run {} stopped early but the configuration changed; starting a new run",
                    run.id
                );
                storage.finish_run(run.id, RunStatus::Interrupted)?;
                None
            }
            None => None,
        };

        let (run_id, frontier, resumed) = match resumed {
            Some((run_id, frontier)) => (run_id, frontier, true),
            None => {
                let seeds = seed(&config.seed_plan(), &alphabet)?;
                let run_id = storage.create_run(config_hash)?;
                let frontier = Frontier::seeded(seeds);
                storage.save_frontier_states(run_id, &frontier.entries())?;
                tracing::info!(
                    "Starting run {} with {} seed prefixes",
                    run_id,
                    frontier.queued_count()
                );
                (run_id, frontier, false)
            }
        };

        let settings = Arc::new(DrainSettings::from_config(&config));

        Ok(Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            storage,
            frontier,
            policy,
            settings,
            run_id,
            resumed,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// True when this coordinator picked up an earlier run
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Token that stops dispatching when cancelled
    ///
    /// In-flight prefixes still run to completion; the run is then marked
    /// interrupted so it can be resumed.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the crawl until the frontier is exhausted or shutdown is requested
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run finished or was interrupted cleanly
    /// * `Err(SweepError)` - A frontier invariant was violated or storage failed;
    ///   the run is marked failed
    pub async fn run(&mut self) -> Result<CrawlReport, SweepError> {
        let worker_count = self.config.crawler.workers;
        let start_time = Instant::now();
        tracing::info!(
            "Starting crawl run {} with {} workers",
            self.run_id,
            worker_count
        );

        let (event_tx, mut events) = mpsc::unbounded_channel();
        let mut jobs = Vec::with_capacity(worker_count as usize);
        let mut handles = Vec::with_capacity(worker_count as usize);

        for id in 0..worker_count {
            let (job_tx, job_rx) = mpsc::channel(1);
            let worker = Worker {
                id,
                factory: Arc::clone(&self.factory),
                settings: Arc::clone(&self.settings),
                database: PathBuf::from(&self.config.output.database_path),
                busy_timeout: self.config.output.busy_timeout(),
                generation: 0,
            };
            handles.push(tokio::spawn(worker.run(job_rx, event_tx.clone())));
            jobs.push(job_tx);
        }
        drop(event_tx);

        let shutdown = self.shutdown.clone();
        let mut idle: VecDeque<u32> = (0..worker_count).collect();
        let mut fatal: Option<SweepError> = None;
        let mut stopping = false;
        let mut drained = 0usize;
        let mut expansions = 0usize;

        loop {
            if !stopping && shutdown.is_cancelled() {
                stopping = true;
                tracing::info!(
                    "Shutdown requested: waiting for {} in-flight prefixes",
                    self.frontier.in_flight_count()
                );
            }

            if !stopping && fatal.is_none() {
                if let Err(e) = self.dispatch(&mut idle, &jobs).await {
                    fatal = Some(e);
                }
            }

            // Events only come from busy workers; with none busy nothing can arrive
            if idle.len() == jobs.len() {
                let stranded = self.frontier.in_flight_count();
                if stranded != 0 {
                    fatal.get_or_insert(SweepError::InvariantViolation(format!(
                        "{} prefixes in flight with every worker idle",
                        stranded
                    )));
                }
                break;
            }

            let event = tokio::select! {
                event = events.recv() => event,
                _ = shutdown.cancelled(), if !stopping => continue,
            };

            let Some(event) = event else {
                fatal.get_or_insert(SweepError::WorkerPool(
                    "all workers stopped with prefixes in flight".to_string(),
                ));
                break;
            };

            match event {
                WorkerEvent::Finished(result) => {
                    idle.push_back(result.worker_id);
                    drained += 1;
                    match self.fold(result) {
                        Ok(true) => expansions += 1,
                        Ok(false) => {}
                        Err(e) => {
                            tracing::error!("Stopping dispatch: {}", e);
                            fatal.get_or_insert(e);
                        }
                    }
                }
                WorkerEvent::Fatal {
                    worker_id,
                    prefix,
                    error,
                } => {
                    idle.push_back(worker_id);
                    tracing::error!(
                        "[worker {}] Invariant violated while draining '{}': {}",
                        worker_id,
                        prefix,
                        error
                    );
                    fatal.get_or_insert(error);
                    if let Err(e) = self.frontier.complete(&prefix, PrefixState::Failed) {
                        tracing::error!("Could not mark '{}' failed: {}", prefix, e);
                    }
                }
            }

            if drained > 0 && drained % 10 == 0 {
                let elapsed = start_time.elapsed();
                tracing::info!(
                    "Progress: {} prefixes drained, {} queued, {} in flight, {:.2} prefixes/min",
                    drained,
                    self.frontier.queued_count(),
                    self.frontier.in_flight_count(),
                    drained as f64 / elapsed.as_secs_f64() * 60.0
                );
            }
        }

        // Closing the job channels stops the workers
        drop(jobs);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker task ended abnormally: {}", e);
            }
        }

        let status = if fatal.is_some() {
            RunStatus::Failed
        } else if self.frontier.is_exhausted() {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };
        self.storage.finish_run(self.run_id, status)?;

        tracing::info!(
            "Crawl run {} {}: {} of {} dispatched prefixes drained ({} expanded) in {:?}, {} still queued",
            self.run_id,
            status.to_db_string(),
            drained,
            self.frontier.dispatched_count(),
            expansions,
            start_time.elapsed(),
            self.frontier.queued_count()
        );

        if let Some(e) = fatal {
            return Err(e);
        }

        CrawlReport::load(&self.storage, self.run_id)
    }

    /// Hands queued prefixes to idle workers
    async fn dispatch(
        &mut self,
        idle: &mut VecDeque<u32>,
        jobs: &[mpsc::Sender<Prefix>],
    ) -> Result<(), SweepError> {
        while let Some(&worker_id) = idle.front() {
            let Some(prefix) = self.frontier.next_prefix()? else {
                break;
            };

            // A prefix no worker received must not stay counted as in flight
            if let Err(e) = self.hand_off(worker_id, &prefix, jobs).await {
                tracing::error!("Could not dispatch '{}': {}", prefix, e);
                self.frontier.complete(&prefix, PrefixState::Failed)?;
                return Err(e);
            }
            idle.pop_front();
        }

        Ok(())
    }

    /// Persists the in-flight state and sends the prefix to its worker
    async fn hand_off(
        &mut self,
        worker_id: u32,
        prefix: &Prefix,
        jobs: &[mpsc::Sender<Prefix>],
    ) -> Result<(), SweepError> {
        self.storage
            .upsert_frontier_state(self.run_id, prefix.as_str(), PrefixState::InFlight)?;

        tracing::debug!("Dispatching '{}' to worker {}", prefix, worker_id);
        jobs[worker_id as usize]
            .send(prefix.clone())
            .await
            .map_err(|_| {
                SweepError::WorkerPool(format!("worker {} stopped accepting prefixes", worker_id))
            })
    }

    /// Folds one result into the frontier and persists the outcome
    ///
    /// Returns true when the prefix was expanded.
    fn fold(&mut self, result: PrefixResult) -> Result<bool, SweepError> {
        let evaluation = self.policy.evaluate(&result, &mut self.frontier)?;

        let mut entries = Vec::with_capacity(evaluation.children.len() + 1);
        entries.push(FrontierEntry {
            prefix: evaluation.prefix.as_str().to_string(),
            state: evaluation.state,
        });
        entries.extend(evaluation.children.iter().map(|child| FrontierEntry {
            prefix: child.as_str().to_string(),
            state: PrefixState::Queued,
        }));

        self.storage.save_frontier_states(self.run_id, &entries)?;
        self.storage
            .record_prefix_result(self.run_id, &result.to_record(evaluation.children.len()))?;

        Ok(evaluation.is_expansion())
    }
}

fn restore_frontier(
    entries: Vec<FrontierEntry>,
    alphabet: &Alphabet,
) -> Result<Frontier, SweepError> {
    let restored = entries
        .into_iter()
        .map(|entry| -> Result<(Prefix, PrefixState), SweepError> {
            Ok((Prefix::parse(&entry.prefix, alphabet)?, entry.state))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Frontier::restore(restored))
}
