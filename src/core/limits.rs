/*!
 * Harness Limits and Constants
 *
 * Centralized location for every fixed knob of the stress run.
 * Organized by subsystem so the tuning surface is visible in one place.
 *
 * - Values that bound host resource usage are marked with [BACKPRESSURE]
 * - Values that come straight from the capture contract are marked with [CONTRACT]
 */

use std::time::Duration;

// =============================================================================
// SPAWN / REAP CHURN
// =============================================================================

/// Spawn iterations on constrained wearable-class hosts
pub const WATCH_SPAWN_ITERATIONS: u64 = 1999;

/// Spawn iterations on phone-class hosts
pub const PHONE_SPAWN_ITERATIONS: u64 = 4999;

/// Spawn iterations on full-capability hosts
pub const DESKTOP_SPAWN_ITERATIONS: u64 = 9999;

/// Unreaped workers allowed before a batched reap pass
/// [BACKPRESSURE] Bounds live/zombie workers outstanding at any time
pub const REAP_INTERVAL: usize = 10;

/// Spawn progress cadence
pub const SPAWN_PROGRESS_INTERVAL: u64 = 100;

// =============================================================================
// CAPTURE
// =============================================================================

/// Total submissions per capture, first attempt included
/// [CONTRACT] BUSY / TIMED_OUT are retried until this is spent
pub const CAPTURE_ATTEMPTS: u32 = 5;

/// Capture progress cadence
pub const CAPTURE_PROGRESS_INTERVAL: u64 = 100;

/// Pause between consecutive captures
pub const CAPTURE_INTERVAL: Duration = Duration::from_micros(100);

/// Upper bound on a single procfs walk before it reports TIMED_OUT
pub const PROCFS_WALK_DEADLINE: Duration = Duration::from_secs(2);

// =============================================================================
// INVOCATION
// =============================================================================

/// Argument that makes the executable act as a worker
pub const WORKER_FLAG: &str = "--worker";

/// Helper name accepted after `-n`, the historical worker selector
pub const WORKER_HELPER_NAME: &str = "spawn_children_helper";

/// Name of the background capture thread
pub const CAPTURE_THREAD_NAME: &str = "stackshot-capture";

// =============================================================================
// EXIT CODES
// =============================================================================

/// Exit status for an unretryable failure raised off the main thread
pub const FATAL_EXIT_CODE: i32 = 1;

/// Exit status of a worker whose exit thread could not be started
pub const WORKER_FAILURE_EXIT_CODE: i32 = 70;
