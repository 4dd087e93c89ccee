/*!
 * Capture Loop
 * Background thread issuing snapshots for the lifetime of the run
 *
 * The loop has no natural end. In a normal run the task is detached and
 * torn down with the process; the stop flag exists so tests and embedders
 * can end it and join the thread.
 */

use super::client::CaptureClient;
use super::types::{CaptureError, CaptureOutcome, CaptureResult};
use crate::core::errors::{HarnessError, HarnessResult};
use crate::core::limits::{CAPTURE_INTERVAL, CAPTURE_PROGRESS_INTERVAL, CAPTURE_THREAD_NAME};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, info_span};

/// Invoked on the capture thread when a capture fails fatally
pub type FatalHandler = Arc<dyn Fn(&HarnessError) + Send + Sync>;

/// Repeatedly captures and counts completed snapshots
pub struct CaptureLoop {
    client: CaptureClient,
    interval: Duration,
    progress_interval: u64,
    completed: u64,
}

impl CaptureLoop {
    pub fn new(client: CaptureClient) -> Self {
        Self {
            client,
            interval: CAPTURE_INTERVAL,
            progress_interval: CAPTURE_PROGRESS_INTERVAL,
            completed: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = every.max(1);
        self
    }

    /// Completed captures so far
    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn client(&self) -> &CaptureClient {
        &self.client
    }

    /// One capture, counted on success
    pub fn step(&mut self) -> CaptureResult<()> {
        match self.client.capture_once() {
            CaptureOutcome::Success => {
                self.completed += 1;
                if self.completed % self.progress_interval == 0 {
                    info!(completed = self.completed, "completed {} stackshots", self.completed);
                }
                Ok(())
            }
            CaptureOutcome::FatalFailure(e) => Err(e),
            // capture_once resolves contention itself
            CaptureOutcome::TransientFailure(status) => Err(CaptureError::RetriesExhausted {
                attempts: self.client.max_attempts(),
                last: status,
            }),
        }
    }

    /// Capture until `stop` is raised or a capture fails fatally
    pub fn run(mut self, stop: &AtomicBool) -> CaptureResult<u64> {
        while !stop.load(Ordering::Acquire) {
            self.step()?;
            thread::sleep(self.interval);
        }
        Ok(self.completed)
    }
}

/// Handle to the background capture thread
pub struct CaptureTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<CaptureResult<u64>>>,
}

impl CaptureTask {
    /// Start `capture_loop` on its own thread
    ///
    /// `on_fatal` runs on the capture thread before it exits with the error.
    pub fn spawn(capture_loop: CaptureLoop, on_fatal: FatalHandler) -> HarnessResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let span = info_span!("capture_loop", facility = capture_loop.client().facility_name());

        let handle = thread::Builder::new()
            .name(CAPTURE_THREAD_NAME.to_string())
            .spawn(move || {
                let _entered = span.enter();
                let result = capture_loop.run(&thread_stop);
                if let Err(e) = &result {
                    on_fatal(&HarnessError::from(e.clone()));
                }
                result
            })
            .map_err(|e| HarnessError::CaptureThread(e.to_string()))?;

        debug!("capture task spawned");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Whether the thread has already returned
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Signal the loop to end and wait for its capture count
    pub fn stop(mut self) -> HarnessResult<u64> {
        self.stop.store(true, Ordering::Release);
        let handle = self.handle.take().ok_or_else(|| {
            HarnessError::CaptureThread("capture task already detached".to_string())
        })?;

        match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(HarnessError::CaptureThread(
                "capture thread panicked".to_string(),
            )),
        }
    }

    /// Leave the thread running until process exit
    pub fn detach(mut self) {
        if self.handle.take().is_some() {
            debug!("capture task detached, process exit will tear it down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::MockCaptureFacility;
    use crate::capture::types::{CaptureStatus, ConfigHandle};
    use parking_lot::Mutex;
    use std::time::Instant;

    fn always(status: CaptureStatus) -> MockCaptureFacility {
        let mut facility = MockCaptureFacility::new();
        facility
            .expect_create_config()
            .returning(|| Some(ConfigHandle::from_raw(3)));
        facility
            .expect_set_flags()
            .returning(|_, _| CaptureStatus::Ok);
        facility.expect_submit().returning(move |_| status);
        facility
            .expect_release()
            .returning(|_| CaptureStatus::Ok);
        facility.expect_name().return_const("mock");
        facility
    }

    #[test]
    fn test_step_counts_successes() {
        let client = CaptureClient::new(Arc::new(always(CaptureStatus::Ok)));
        let mut capture_loop = CaptureLoop::new(client).with_progress_interval(2);

        for _ in 0..5 {
            capture_loop.step().unwrap();
        }
        assert_eq!(capture_loop.completed(), 5);
        assert_eq!(capture_loop.client().stats().captures, 5);
    }

    #[test]
    fn test_run_stops_on_flag() {
        let client = CaptureClient::new(Arc::new(always(CaptureStatus::Ok)));
        let stop = AtomicBool::new(true);
        assert_eq!(CaptureLoop::new(client).run(&stop).unwrap(), 0);
    }

    #[test]
    fn test_task_stop_returns_count() {
        let client = CaptureClient::new(Arc::new(always(CaptureStatus::Ok)));
        let capture_loop = CaptureLoop::new(client).with_interval(Duration::from_micros(10));
        let task = CaptureTask::spawn(capture_loop, Arc::new(|_: &HarnessError| {})).unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(!task.is_finished());
        let completed = task.stop().unwrap();
        assert!(completed > 0);
    }

    #[test]
    fn test_fatal_failure_reaches_handler() {
        let client = CaptureClient::new(Arc::new(always(CaptureStatus::Busy)));
        let seen: Arc<Mutex<Vec<HarnessError>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let task = CaptureTask::spawn(
            CaptureLoop::new(client),
            Arc::new(move |e: &HarnessError| sink.lock().push(e.clone())),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !task.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        let expected = CaptureError::RetriesExhausted {
            attempts: 5,
            last: CaptureStatus::Busy,
        };
        assert_eq!(task.stop(), Err(HarnessError::Capture(expected.clone())));
        assert_eq!(*seen.lock(), vec![HarnessError::Capture(expected)]);
    }
}
