/*!
 * Worker Program
 * Short-lived churn process: start one thread, let it end the process
 */

use crate::core::limits::WORKER_FAILURE_EXIT_CODE;
use std::process;
use std::thread;

/// Run as a worker; never returns
///
/// The secondary thread exits the whole process with status 0. The main
/// thread just joins it, so it can neither finish first nor spin forever.
pub fn run() -> ! {
    let spawned = thread::Builder::new()
        .name("worker-exit".to_string())
        .spawn(|| {
            process::exit(0);
        });

    match spawned {
        Ok(handle) => {
            // Only reachable if the exit thread panicked
            let _ = handle.join();
            process::exit(WORKER_FAILURE_EXIT_CODE)
        }
        Err(e) => {
            eprintln!("worker: cannot start exit thread: {}", e);
            process::exit(WORKER_FAILURE_EXIT_CODE)
        }
    }
}
