/*!
 * Capture Client Tests
 * Retry budget, outcome classification and request release accounting
 */

use nix::errno::Errno;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use stackshot_stress::capture::{
    CaptureClient, CaptureError, CaptureFacility, CaptureFlags, CaptureLoop, CaptureOutcome,
    CaptureStatus, ConfigHandle,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Facility replaying a fixed script of submit statuses
#[derive(Default)]
struct ScriptedFacility {
    script: Mutex<VecDeque<CaptureStatus>>,
    fail_create: bool,
    created: AtomicUsize,
    released: AtomicUsize,
    submitted: AtomicUsize,
}

impl ScriptedFacility {
    fn new(script: Vec<CaptureStatus>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    fn failing_create() -> Arc<Self> {
        Arc::new(Self {
            fail_create: true,
            ..Default::default()
        })
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

impl CaptureFacility for ScriptedFacility {
    fn create_config(&self) -> Option<ConfigHandle> {
        if self.fail_create {
            return None;
        }
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Some(ConfigHandle::from_raw(id + 1))
    }

    fn set_flags(&self, _config: &ConfigHandle, flags: CaptureFlags) -> CaptureStatus {
        assert_eq!(flags, CaptureFlags::STRESS);
        CaptureStatus::Ok
    }

    fn submit(&self, _config: &ConfigHandle) -> CaptureStatus {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or(CaptureStatus::Ok)
    }

    fn release(&self, _config: ConfigHandle) -> CaptureStatus {
        self.released.fetch_add(1, Ordering::SeqCst);
        CaptureStatus::Ok
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[test]
fn test_busy_four_times_then_success() {
    let facility = ScriptedFacility::new(vec![
        CaptureStatus::Busy,
        CaptureStatus::Busy,
        CaptureStatus::Busy,
        CaptureStatus::Busy,
        CaptureStatus::Ok,
    ]);
    let mut client = CaptureClient::new(facility.clone());

    assert_eq!(client.capture_once(), CaptureOutcome::Success);
    assert_eq!(facility.submitted(), 5);
    assert_eq!(facility.created(), 1);
    assert_eq!(facility.released(), 1);
}

#[test]
fn test_busy_every_attempt_is_fatal_and_released() {
    let facility = ScriptedFacility::new(vec![CaptureStatus::Busy; 6]);
    let mut client = CaptureClient::new(facility.clone());

    assert_eq!(
        client.capture_once(),
        CaptureOutcome::FatalFailure(CaptureError::RetriesExhausted {
            attempts: 5,
            last: CaptureStatus::Busy,
        })
    );
    assert_eq!(facility.submitted(), 5);
    assert_eq!(facility.released(), 1);
}

#[test]
fn test_timed_out_is_retried() {
    let facility = ScriptedFacility::new(vec![CaptureStatus::TimedOut, CaptureStatus::Ok]);
    let mut client = CaptureClient::new(facility.clone());

    assert!(client.capture_once().is_success());
    assert_eq!(client.stats().transient_failures, 1);
}

#[test]
fn test_fatal_status_released_without_retry() {
    let enomem = CaptureStatus::Error(Errno::ENOMEM as i32);
    let facility = ScriptedFacility::new(vec![enomem, CaptureStatus::Ok]);
    let mut client = CaptureClient::new(facility.clone());

    assert_eq!(
        client.capture_once(),
        CaptureOutcome::FatalFailure(CaptureError::Submit { status: enomem })
    );
    assert_eq!(facility.submitted(), 1);
    assert_eq!(facility.released(), 1);
}

#[test]
fn test_create_failure_is_fatal() {
    let facility = ScriptedFacility::failing_create();
    let mut client = CaptureClient::new(facility.clone());

    assert_eq!(
        client.capture_once(),
        CaptureOutcome::FatalFailure(CaptureError::ConfigCreate)
    );
    assert_eq!(facility.submitted(), 0);
    assert_eq!(facility.released(), 0);
}

#[test]
fn test_loop_counter_advances_once_per_success() {
    let facility = ScriptedFacility::new(vec![
        CaptureStatus::Ok,
        CaptureStatus::Busy,
        CaptureStatus::Ok,
        CaptureStatus::Ok,
    ]);
    let mut capture_loop = CaptureLoop::new(CaptureClient::new(facility.clone()));

    let mut previous = capture_loop.completed();
    for _ in 0..3 {
        capture_loop.step().unwrap();
        assert_eq!(capture_loop.completed(), previous + 1);
        previous = capture_loop.completed();
    }
    assert_eq!(facility.created(), 3);
    assert_eq!(facility.released(), 3);
}

fn status_strategy() -> impl Strategy<Value = CaptureStatus> {
    prop_oneof![
        4 => Just(CaptureStatus::Busy),
        2 => Just(CaptureStatus::TimedOut),
        3 => Just(CaptureStatus::Ok),
        1 => Just(CaptureStatus::Error(Errno::EINVAL as i32)),
    ]
}

proptest! {
    #[test]
    fn prop_release_once_and_bounded_attempts(
        scripts in prop::collection::vec(prop::collection::vec(status_strategy(), 0..8), 1..10)
    ) {
        for script in scripts {
            let facility = ScriptedFacility::new(script.clone());
            let mut client = CaptureClient::new(facility.clone());
            let outcome = client.capture_once();

            prop_assert_eq!(facility.created(), 1);
            prop_assert_eq!(facility.released(), 1);
            prop_assert!(facility.submitted() <= 5);

            // An empty script position reads as OK
            let first_decisive = script
                .iter()
                .take(5)
                .position(|s| !s.is_transient());
            match first_decisive.map(|i| script[i]) {
                Some(CaptureStatus::Ok) => prop_assert_eq!(outcome, CaptureOutcome::Success),
                Some(status @ CaptureStatus::Error(_)) => prop_assert_eq!(
                    outcome,
                    CaptureOutcome::FatalFailure(CaptureError::Submit { status })
                ),
                _ if script.len() >= 5 => {
                    let exhausted = matches!(
                        outcome,
                        CaptureOutcome::FatalFailure(CaptureError::RetriesExhausted {
                            attempts: 5,
                            ..
                        })
                    );
                    prop_assert!(exhausted, "{:?}", outcome);
                }
                _ => prop_assert_eq!(outcome, CaptureOutcome::Success),
            }
        }
    }
}
