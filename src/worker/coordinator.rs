//! Spawns and joins one worker task per region

use anyhow::{bail, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::{RegionalWorker, WorkerStats};
use crate::acquisition::Acquirer;
use crate::config::Config;
use crate::models::Region;

/// Runs the regional workers side by side
pub struct Coordinator {
    config: Config,
    acquirer: Acquirer,
}

impl Coordinator {
    pub fn new(config: Config, acquirer: Acquirer) -> Self {
        Self { config, acquirer }
    }

    /// Spawn a worker task for each region, deduplicated
    pub fn spawn(
        &self,
        regions: &[Region],
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<(Region, JoinHandle<WorkerStats>)> {
        let mut seen = Vec::new();
        regions
            .iter()
            .copied()
            .filter(|region| {
                let fresh = !seen.contains(region);
                seen.push(*region);
                fresh
            })
            .map(|region| {
                let worker = RegionalWorker::from_config(region, &self.config, self.acquirer.clone());
                let shutdown = shutdown.clone();
                (region, tokio::spawn(worker.run(shutdown)))
            })
            .collect()
    }

    /// Run workers for `regions` until shutdown, then collect their stats
    pub async fn run(
        &self,
        regions: &[Region],
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<(Region, WorkerStats)>> {
        if regions.is_empty() {
            bail!("No regions to run");
        }

        let handles = self.spawn(regions, &shutdown);
        info!(workers = handles.len(), sources = ?self.acquirer.sources(), "Workers running");

        let mut results = Vec::with_capacity(handles.len());
        for (region, handle) in handles {
            match handle.await {
                Ok(stats) => results.push((region, stats)),
                Err(e) => error!(region = %region, error = %e, "Worker task failed"),
            }
        }
        Ok(results)
    }
}
