/*!
 * Stackshot Stress - Main Entry Point
 *
 * One executable, two roles:
 * - Orchestrator (no arguments): capture loop in the background,
 *   spawn/reap churn in the foreground
 * - Worker (--worker): exits almost immediately from a secondary thread
 */

use stackshot_stress::{init_tracing, worker, Harness, HarnessConfig, Invocation};
use tracing::info;

fn main() -> miette::Result<()> {
    match Invocation::parse(std::env::args_os().skip(1))? {
        Invocation::Worker => worker::run(),
        Invocation::Orchestrator => {
            init_tracing();

            info!("Stackshot spawn/exit stress starting...");
            info!("================================================");

            let config = HarnessConfig::from_env()?;
            info!(
                host_class = ?config.host_class,
                iterations = config.spawn_budget(),
                "Configuration loaded"
            );

            let report = Harness::builder(config).build()?.run()?;

            info!("================================================");
            info!(
                spawned = report.spawned,
                reaped = report.reaped,
                "Stress run complete, exiting"
            );
            Ok(())
        }
    }
}
