//! Regional acquisition workers
//!
//! One [`RegionalWorker`] per region runs an independent loop:
//!
//! ```text
//! FetchingBatch ──► Dispatching ──► Cooling ──► Dispatching ... ──► FetchingBatch
//!      │ empty                                        │ fault
//!      ▼                                              ▼
//!     Idle                                         Backoff
//! ```
//!
//! Workers never share mutable state. Each owns its [`DomainPool`] and only
//! touches variants its region claims. Shutdown is observed between items,
//! never in the middle of the pacing pause.

pub mod coordinator;
pub mod pacing;
pub mod pool;

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::acquisition::{Acquirer, PassSummary, RegionScope};
use crate::config::Config;
use crate::models::{Region, Variant};

pub use coordinator::Coordinator;
pub use pacing::Pacing;
pub use pool::DomainPool;

/// Worker loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    FetchingBatch,
    Dispatching,
    Cooling,
    Idle,
    Backoff,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchingBatch => "fetching_batch",
            Self::Dispatching => "dispatching",
            Self::Cooling => "cooling",
            Self::Idle => "idle",
            Self::Backoff => "backoff",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counters reported when a worker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: u64,
    pub processed: u64,
    pub failures: u64,
    /// Variants refused by the region re-check
    pub skipped: u64,
    pub backoffs: u64,
}

/// How one batch cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Empty,
    Processed(usize),
    Stopped,
}

/// Timing knobs for the worker loop
#[derive(Debug, Clone, Copy)]
pub struct WorkerTiming {
    pub batch_size: usize,
    pub pacing: Pacing,
    pub idle: Duration,
    pub backoff: Duration,
}

impl WorkerTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.worker.batch_size.max(1),
            pacing: Pacing::new(
                config.worker.multi_domain_pacing,
                config.worker.single_domain_pacing,
            ),
            idle: config.idle_interval(),
            backoff: config.backoff_interval(),
        }
    }
}

/// Acquisition loop for one region
pub struct RegionalWorker {
    region: Region,
    fallback: Region,
    pool: DomainPool,
    timing: WorkerTiming,
    acquirer: Acquirer,
    state: WorkerState,
    stats: WorkerStats,
}

impl RegionalWorker {
    pub fn new(
        region: Region,
        fallback: Region,
        pool: DomainPool,
        timing: WorkerTiming,
        acquirer: Acquirer,
    ) -> Self {
        Self {
            region,
            fallback,
            pool,
            timing,
            acquirer,
            state: WorkerState::FetchingBatch,
            stats: WorkerStats::default(),
        }
    }

    /// Worker for `region` using the configured pool and timing
    pub fn from_config(region: Region, config: &Config, acquirer: Acquirer) -> Self {
        Self::new(
            region,
            config.worker.fallback_region,
            DomainPool::new(config.storefront.pools.for_region(region).iter().cloned()),
            WorkerTiming::from_config(config),
            acquirer,
        )
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    fn transition(&mut self, next: WorkerState) {
        if self.state != next {
            debug!(region = %self.region, from = %self.state, to = %next, "Worker state");
            self.state = next;
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        info!(
            region = %self.region,
            domains = self.pool.len(),
            batch_size = self.timing.batch_size,
            "Regional worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let cycle = AssertUnwindSafe(self.run_cycle(&shutdown))
                .catch_unwind()
                .await;

            let pause = match cycle {
                Ok(Ok(CycleOutcome::Stopped)) => break,
                Ok(Ok(CycleOutcome::Processed(count))) => {
                    debug!(region = %self.region, count, "Batch finished");
                    continue;
                }
                Ok(Ok(CycleOutcome::Empty)) => {
                    self.transition(WorkerState::Idle);
                    self.timing.idle
                }
                Ok(Err(e)) => {
                    error!(region = %self.region, error = %e, "Worker loop fault, backing off");
                    self.enter_backoff()
                }
                Err(_) => {
                    error!(region = %self.region, "Worker loop panicked, backing off");
                    self.enter_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    // Sender gone: nobody can ask us to stop any more
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.transition(WorkerState::Stopped);
        info!(
            region = %self.region,
            processed = self.stats.processed,
            failures = self.stats.failures,
            backoffs = self.stats.backoffs,
            "Regional worker stopped"
        );
        self.stats
    }

    fn enter_backoff(&mut self) -> Duration {
        self.transition(WorkerState::Backoff);
        self.stats.backoffs += 1;
        self.timing.backoff
    }

    /// Fetch one batch and dispatch every variant in it.
    ///
    /// Per-item errors and panics are contained: the variant is stamped and
    /// the rest of the batch still runs. Only failures outside item dispatch,
    /// such as batch selection, surface as loop-level faults.
    pub async fn run_cycle(&mut self, shutdown: &watch::Receiver<bool>) -> Result<CycleOutcome> {
        self.transition(WorkerState::FetchingBatch);

        let include_standard = self.region == self.fallback;
        let batch = self.acquirer.repository().select_batch(
            self.region,
            include_standard,
            self.timing.batch_size,
        )?;
        self.stats.batches += 1;

        if batch.is_empty() {
            return Ok(CycleOutcome::Empty);
        }
        debug!(region = %self.region, size = batch.len(), "Batch selected");

        let mut processed = 0;
        for variant in &batch {
            if *shutdown.borrow() {
                return Ok(CycleOutcome::Stopped);
            }

            self.transition(WorkerState::Dispatching);
            let dispatched = AssertUnwindSafe(self.dispatch(variant))
                .catch_unwind()
                .await;

            match dispatched {
                Ok(Ok(summary)) if summary.skipped => self.stats.skipped += 1,
                Ok(Ok(_)) => {
                    self.stats.processed += 1;
                    processed += 1;
                }
                Ok(Err(e)) => {
                    self.stats.failures += 1;
                    warn!(
                        region = %self.region,
                        variant_id = variant.id,
                        error = %e,
                        "Variant acquisition failed"
                    );
                    self.stamp(variant.id);
                }
                Err(_) => {
                    self.stats.failures += 1;
                    error!(
                        region = %self.region,
                        variant_id = variant.id,
                        "Panic while dispatching variant"
                    );
                    self.stamp(variant.id);
                }
            }

            // Also runs after the last item: the next batch's first request
            // is paced like any other
            self.transition(WorkerState::Cooling);
            tokio::time::sleep(self.timing.pacing.delay(self.pool.rotates())).await;
        }

        Ok(CycleOutcome::Processed(processed))
    }

    /// Acquire one variant by id, regardless of its place in the queue
    pub async fn process_variant(&mut self, variant_id: i64) -> Result<PassSummary> {
        let variant = self
            .acquirer
            .repository()
            .get_variant(variant_id)?
            .ok_or_else(|| anyhow!("Variant {variant_id} not found"))?;

        let result = self.dispatch(&variant).await;
        if result.is_err() {
            self.stamp(variant_id);
        }
        result
    }

    async fn dispatch(&mut self, variant: &Variant) -> Result<PassSummary> {
        let domain = self.pool.next_domain().map(str::to_string);
        let scope = RegionScope::new(self.region, self.fallback, self.pool.domains());

        if !scope.claims(variant.region_tag) {
            warn!(
                region = %self.region,
                variant_id = variant.id,
                region_tag = %variant.region_tag,
                "Variant rejected by region re-check"
            );
            return Ok(PassSummary::skipped(variant.id));
        }

        self.acquirer
            .acquire(variant, &scope, domain.as_deref())
            .await
    }

    /// Move a variant to the back of the queue after a failed pass
    fn stamp(&self, variant_id: i64) {
        if let Err(e) = self
            .acquirer
            .repository()
            .record_acquisition(variant_id, Utc::now(), None)
        {
            error!(region = %self.region, variant_id, error = %e, "Failed to stamp variant");
        }
    }
}

impl fmt::Debug for RegionalWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionalWorker")
            .field("region", &self.region)
            .field("fallback", &self.fallback)
            .field("pool", &self.pool)
            .field("state", &self.state)
            .finish()
    }
}
