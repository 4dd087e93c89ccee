/*!
 * Spawn/Reap Churn
 * Fixed-budget worker churn with batched reaping
 *
 * SPAWNING -> (threshold reached) -> REAPING -> SPAWNING ... -> DRAINING
 *
 * At most `reap_threshold` workers are outstanding at any time.
 */

use super::traits::ProcessLauncher;
use super::types::{ChurnPhase, ChurnReport, ProcessError, ProcessResult, ReapPass};
use crate::core::config::HarnessConfig;
use crate::core::limits::{REAP_INTERVAL, SPAWN_PROGRESS_INTERVAL};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Spawned workers not yet reaped
#[derive(Debug, Clone)]
pub struct PendingChildren {
    threshold: usize,
    outstanding: HashSet<u32>,
}

impl PendingChildren {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            outstanding: HashSet::with_capacity(threshold),
        }
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Batch is due
    pub fn is_full(&self) -> bool {
        self.outstanding.len() >= self.threshold
    }

    pub fn record_spawn(&mut self, pid: u32) {
        self.outstanding.insert(pid);
    }

    pub fn record_reap(&mut self, pid: u32) -> ProcessResult<()> {
        if self.outstanding.remove(&pid) {
            Ok(())
        } else {
            Err(ProcessError::UnknownChild(pid))
        }
    }
}

/// Churn tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChurnSettings {
    pub iterations: u64,
    pub reap_threshold: usize,
    pub progress_interval: u64,
}

impl ChurnSettings {
    pub fn new(iterations: u64) -> Self {
        Self {
            iterations,
            reap_threshold: REAP_INTERVAL,
            progress_interval: SPAWN_PROGRESS_INTERVAL,
        }
    }

    pub fn with_reap_threshold(mut self, threshold: usize) -> Self {
        self.reap_threshold = threshold;
        self
    }
}

impl From<&HarnessConfig> for ChurnSettings {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            iterations: config.spawn_budget(),
            reap_threshold: config.reap_threshold,
            progress_interval: SPAWN_PROGRESS_INTERVAL,
        }
    }
}

/// Drives worker churn for a fixed number of spawns
pub struct SpawnReapLoop<L: ProcessLauncher> {
    launcher: L,
    settings: ChurnSettings,
    pending: PendingChildren,
    report: ChurnReport,
}

impl<L: ProcessLauncher> SpawnReapLoop<L> {
    pub fn new(launcher: L, settings: ChurnSettings) -> Self {
        Self {
            launcher,
            pending: PendingChildren::new(settings.reap_threshold),
            settings,
            report: ChurnReport::default(),
        }
    }

    /// Spawn the full budget, reaping in batches, then drain
    ///
    /// Any spawn or reap failure ends the run immediately.
    pub fn run(mut self) -> ProcessResult<ChurnReport> {
        let progress_every = self.settings.progress_interval.max(1);

        for iteration in 1..=self.settings.iterations {
            debug_assert!(self.pending.len() <= self.pending.threshold());

            let pid = self.launcher.spawn_worker()?;
            self.report.spawned += 1;
            self.pending.record_spawn(pid);

            if self.pending.is_full() {
                self.reap_pending(ChurnPhase::Reaping)?;
            }

            if iteration % progress_every == 0 {
                info!(spawned = iteration, "spawned {} children thus far", iteration);
            }
        }

        self.reap_pending(ChurnPhase::Draining)?;
        debug_assert_eq!(self.report.spawned, self.report.reaped);
        Ok(self.report)
    }

    fn reap_pending(&mut self, phase: ChurnPhase) -> ProcessResult<()> {
        let mut reaped = 0;

        while !self.pending.is_empty() {
            let child = self.launcher.wait_any()?;
            self.pending.record_reap(child.pid)?;
            reaped += 1;
            self.report.reaped += 1;

            if !child.exit.is_success() {
                self.report.abnormal_exits += 1;
                warn!(pid = child.pid, exit = ?child.exit, "worker exited abnormally");
            }
        }

        if reaped > 0 {
            debug!(?phase, reaped, after_spawn = self.report.spawned, "reap pass complete");
            self.report.passes.push(ReapPass {
                after_spawn: self.report.spawned,
                reaped,
                phase,
            });
        }
        Ok(())
    }
}
