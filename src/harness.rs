/*!
 * Harness Orchestrator
 * Starts the capture loop, then drives spawn/reap churn to completion
 *
 * The capture thread is started strictly before the first spawn so that
 * capture contention is present for the whole churn. Nothing is shared
 * between the two activities; they only compete for the kernel.
 */

use crate::capture::{
    platform_default, CaptureClient, CaptureFacility, CaptureLoop, CaptureTask, FatalHandler,
};
use crate::core::config::HarnessConfig;
use crate::core::errors::{HarnessError, HarnessResult};
use crate::core::limits::FATAL_EXIT_CODE;
use crate::monitoring::RunSpan;
use crate::process::{ChurnReport, ChurnSettings, OsLauncher, ProcessLauncher, SpawnReapLoop};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// Default fatal handler: report and exit the whole process
///
/// Used on the capture thread, where there is no caller to return an error to.
pub fn abort_run(err: &HarnessError) {
    error!(error = %err, "fatal failure, aborting run");
    eprintln!("{:?}", miette::Report::new(err.clone()));
    std::process::exit(FATAL_EXIT_CODE);
}

/// Outcome of a run whose capture thread was stopped and joined
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub churn: ChurnReport,
    pub captures: u64,
}

/// Builder for [`Harness`]
pub struct HarnessBuilder {
    config: HarnessConfig,
    facility: Option<Arc<dyn CaptureFacility>>,
    launcher: Option<Box<dyn ProcessLauncher>>,
    on_fatal: Option<FatalHandler>,
}

impl HarnessBuilder {
    pub fn with_facility(mut self, facility: Arc<dyn CaptureFacility>) -> Self {
        self.facility = Some(facility);
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn ProcessLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn with_fatal_handler(mut self, on_fatal: FatalHandler) -> Self {
        self.on_fatal = Some(on_fatal);
        self
    }

    /// Fill unset collaborators with the platform defaults
    pub fn build(self) -> HarnessResult<Harness> {
        self.config.validate()?;

        let facility = match self.facility {
            Some(facility) => facility,
            None => platform_default()?,
        };
        let launcher = match self.launcher {
            Some(launcher) => launcher,
            None => Box::new(OsLauncher::new(self.config.resolve_worker_path()?)),
        };

        Ok(Harness {
            config: self.config,
            facility,
            launcher,
            on_fatal: self
                .on_fatal
                .unwrap_or_else(|| Arc::new(abort_run) as FatalHandler),
        })
    }
}

/// One configured stress run
pub struct Harness {
    config: HarnessConfig,
    facility: Arc<dyn CaptureFacility>,
    launcher: Box<dyn ProcessLauncher>,
    on_fatal: FatalHandler,
}

impl Harness {
    pub fn builder(config: HarnessConfig) -> HarnessBuilder {
        HarnessBuilder {
            config,
            facility: None,
            launcher: None,
            on_fatal: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run the churn to completion, leaving the capture thread to process exit
    pub fn run(self) -> HarnessResult<ChurnReport> {
        let (churn, capture_task) = self.execute()?;
        capture_task.detach();
        churn
    }

    /// Run the churn, then stop and join the capture thread
    pub fn run_to_completion(self) -> HarnessResult<RunSummary> {
        let (churn, capture_task) = self.execute()?;
        let captures = capture_task.stop();
        let churn = churn?;
        Ok(RunSummary {
            churn,
            captures: captures?,
        })
    }

    fn execute(self) -> HarnessResult<(HarnessResult<ChurnReport>, CaptureTask)> {
        let run_span = RunSpan::new("stackshot_spawn_exit");
        let _entered = run_span.enter();

        let settings = ChurnSettings::from(&self.config);
        info!(
            facility = self.facility.name(),
            iterations = settings.iterations,
            reap_threshold = settings.reap_threshold,
            config = %serde_json::to_string(&self.config).unwrap_or_default(),
            "starting stackshot spawn/exit stress"
        );

        let client = CaptureClient::new(self.facility);
        let capture_loop = CaptureLoop::new(client).with_interval(self.config.capture_interval);
        let capture_task = CaptureTask::spawn(capture_loop, self.on_fatal)?;

        let churn = SpawnReapLoop::new(self.launcher, settings)
            .run()
            .map_err(HarnessError::from);

        match &churn {
            Ok(report) => info!(
                spawned = report.spawned,
                reaped = report.reaped,
                reap_passes = report.passes.len(),
                abnormal_exits = report.abnormal_exits,
                "spawn/exit churn complete"
            ),
            Err(e) => error!(error = %e, "spawn/exit churn failed"),
        }

        Ok((churn, capture_task))
    }
}
