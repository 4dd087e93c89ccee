/*!
 * Capture Client
 * One snapshot per call, with bounded retry on facility contention
 */

use super::request::CaptureRequest;
use super::traits::CaptureFacility;
use super::types::{CaptureError, CaptureFlags, CaptureOutcome, CaptureStatus};
use crate::core::limits::CAPTURE_ATTEMPTS;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Running totals for one client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Successful captures
    pub captures: u64,
    /// Submissions, retries included
    pub attempts: u64,
    /// Submissions that hit BUSY or ETIMEDOUT
    pub transient_failures: u64,
    /// Submissions used by the most recent capture
    pub last_attempts: u32,
}

/// Issues capture requests against a facility
pub struct CaptureClient {
    facility: Arc<dyn CaptureFacility>,
    flags: CaptureFlags,
    max_attempts: u32,
    stats: CaptureStats,
}

impl CaptureClient {
    /// Client with the fixed stress flag set and the default retry budget
    pub fn new(facility: Arc<dyn CaptureFacility>) -> Self {
        Self::with_attempts(facility, CAPTURE_ATTEMPTS)
    }

    /// Client with a custom attempt budget (first attempt included)
    pub(crate) fn with_attempts(facility: Arc<dyn CaptureFacility>, max_attempts: u32) -> Self {
        Self {
            facility,
            flags: CaptureFlags::STRESS,
            max_attempts: max_attempts.max(1),
            stats: CaptureStats::default(),
        }
    }

    pub fn facility_name(&self) -> &'static str {
        self.facility.name()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Take one snapshot
    ///
    /// Never returns `TransientFailure`: contention is retried here and
    /// becomes `FatalFailure` once the attempt budget is spent.
    pub fn capture_once(&mut self) -> CaptureOutcome {
        let request = match CaptureRequest::create(self.facility.as_ref(), self.flags) {
            Ok(request) => request,
            Err(e) => return CaptureOutcome::FatalFailure(e),
        };

        let mut last = CaptureStatus::Ok;
        for attempt in 1..=self.max_attempts {
            self.stats.attempts += 1;

            match CaptureOutcome::classify(request.submit()) {
                CaptureOutcome::Success => {
                    self.stats.captures += 1;
                    self.stats.last_attempts = attempt;
                    trace!(attempt, "capture complete");
                    request.release();
                    return CaptureOutcome::Success;
                }
                CaptureOutcome::TransientFailure(status) => {
                    self.stats.transient_failures += 1;
                    debug!(attempt, %status, "capture facility contended");
                    last = status;
                }
                fatal => return fatal,
            }
        }

        self.stats.last_attempts = self.max_attempts;
        CaptureOutcome::FatalFailure(CaptureError::RetriesExhausted {
            attempts: self.max_attempts,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::MockCaptureFacility;
    use crate::capture::types::ConfigHandle;
    use mockall::Sequence;
    use nix::errno::Errno;

    fn mock_with_submits(statuses: Vec<CaptureStatus>) -> MockCaptureFacility {
        let mut facility = MockCaptureFacility::new();
        facility
            .expect_create_config()
            .times(1)
            .returning(|| Some(ConfigHandle::from_raw(1)));
        facility
            .expect_set_flags()
            .withf(|_, flags| *flags == CaptureFlags::STRESS)
            .times(1)
            .returning(|_, _| CaptureStatus::Ok);

        let mut seq = Sequence::new();
        for status in statuses {
            facility
                .expect_submit()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| status);
        }

        facility
            .expect_release()
            .times(1)
            .returning(|_| CaptureStatus::Ok);
        facility.expect_name().return_const("mock");
        facility
    }

    #[test]
    fn test_first_attempt_success() {
        let mut client = CaptureClient::new(Arc::new(mock_with_submits(vec![CaptureStatus::Ok])));
        assert_eq!(client.capture_once(), CaptureOutcome::Success);
        assert_eq!(client.stats().last_attempts, 1);
        assert_eq!(client.stats().captures, 1);
    }

    #[test]
    fn test_busy_then_success_on_last_attempt() {
        let statuses = vec![
            CaptureStatus::Busy,
            CaptureStatus::TimedOut,
            CaptureStatus::Busy,
            CaptureStatus::Busy,
            CaptureStatus::Ok,
        ];
        let mut client = CaptureClient::new(Arc::new(mock_with_submits(statuses)));

        assert_eq!(client.capture_once(), CaptureOutcome::Success);
        let stats = client.stats();
        assert_eq!(stats.last_attempts, 5);
        assert_eq!(stats.attempts, 5);
        assert_eq!(stats.transient_failures, 4);
    }

    #[test]
    fn test_busy_exhausts_budget() {
        let mut client =
            CaptureClient::new(Arc::new(mock_with_submits(vec![CaptureStatus::Busy; 5])));

        assert_eq!(
            client.capture_once(),
            CaptureOutcome::FatalFailure(CaptureError::RetriesExhausted {
                attempts: 5,
                last: CaptureStatus::Busy,
            })
        );
        assert_eq!(client.stats().attempts, 5);
        assert_eq!(client.stats().captures, 0);
    }

    #[test]
    fn test_non_transient_error_is_not_retried() {
        let eperm = CaptureStatus::Error(Errno::EPERM as i32);
        let mut client = CaptureClient::new(Arc::new(mock_with_submits(vec![eperm])));

        assert_eq!(
            client.capture_once(),
            CaptureOutcome::FatalFailure(CaptureError::Submit { status: eperm })
        );
        assert_eq!(client.stats().attempts, 1);
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        let facility = Arc::new(mock_with_submits(vec![CaptureStatus::Ok]));
        let mut client = CaptureClient::with_attempts(facility, 0);
        assert_eq!(client.max_attempts(), 1);
        assert!(client.capture_once().is_success());
    }
}
