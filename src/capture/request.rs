/*!
 * Capture Request
 * Scoped ownership of a facility configuration
 */

use super::traits::CaptureFacility;
use super::types::{CaptureError, CaptureFlags, CaptureResult, CaptureStatus, ConfigHandle};
use nix::errno::Errno;
use tracing::error;

/// A configured capture request
///
/// The configuration is released exactly once: either through
/// [`CaptureRequest::release`] or, on any early return, when the request drops.
pub struct CaptureRequest<'f> {
    facility: &'f dyn CaptureFacility,
    handle: Option<ConfigHandle>,
    flags: CaptureFlags,
}

impl<'f> CaptureRequest<'f> {
    /// Create a configuration and apply `flags` to it
    pub fn create(facility: &'f dyn CaptureFacility, flags: CaptureFlags) -> CaptureResult<Self> {
        let handle = facility.create_config().ok_or(CaptureError::ConfigCreate)?;
        let request = Self {
            facility,
            handle: Some(handle),
            flags,
        };

        let status = request
            .handle
            .as_ref()
            .map_or(CaptureStatus::Error(Errno::EINVAL as i32), |h| {
                facility.set_flags(h, flags)
            });
        if !status.is_ok() {
            // request drops here and releases the configuration
            return Err(CaptureError::SetFlags {
                flags: flags.bits(),
                status,
            });
        }

        Ok(request)
    }

    pub fn flags(&self) -> CaptureFlags {
        self.flags
    }

    /// Submit the request once
    pub fn submit(&self) -> CaptureStatus {
        match &self.handle {
            Some(handle) => self.facility.submit(handle),
            None => CaptureStatus::Error(Errno::EINVAL as i32),
        }
    }

    /// Release the configuration and report the facility's verdict
    pub fn release(mut self) -> CaptureStatus {
        self.release_inner()
    }

    fn release_inner(&mut self) -> CaptureStatus {
        match self.handle.take() {
            Some(handle) => {
                let status = self.facility.release(handle);
                if !status.is_ok() {
                    error!(
                        facility = self.facility.name(),
                        %status,
                        "failed to deallocate capture config"
                    );
                }
                status
            }
            None => CaptureStatus::Ok,
        }
    }
}

impl Drop for CaptureRequest<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::MockCaptureFacility;

    fn facility_expecting_release(set_flags: CaptureStatus) -> MockCaptureFacility {
        let mut facility = MockCaptureFacility::new();
        facility
            .expect_create_config()
            .times(1)
            .returning(|| Some(ConfigHandle::from_raw(7)));
        facility
            .expect_set_flags()
            .times(1)
            .returning(move |_, _| set_flags);
        facility
            .expect_release()
            .withf(|handle| handle.as_raw() == 7)
            .times(1)
            .returning(|_| CaptureStatus::Ok);
        facility.expect_name().return_const("mock");
        facility
    }

    #[test]
    fn test_explicit_release_happens_once() {
        let facility = facility_expecting_release(CaptureStatus::Ok);
        let request = CaptureRequest::create(&facility, CaptureFlags::STRESS).unwrap();
        assert_eq!(request.flags(), CaptureFlags::STRESS);
        assert_eq!(request.release(), CaptureStatus::Ok);
    }

    #[test]
    fn test_drop_releases() {
        let facility = facility_expecting_release(CaptureStatus::Ok);
        let request = CaptureRequest::create(&facility, CaptureFlags::STRESS).unwrap();
        drop(request);
    }

    #[test]
    fn test_set_flags_failure_releases() {
        let einval = CaptureStatus::Error(Errno::EINVAL as i32);
        let facility = facility_expecting_release(einval);
        let result = CaptureRequest::create(&facility, CaptureFlags::STRESS);
        assert!(matches!(
            result,
            Err(CaptureError::SetFlags { status, .. }) if status == einval
        ));
    }

    #[test]
    fn test_null_config_is_fatal_without_release() {
        let mut facility = MockCaptureFacility::new();
        facility.expect_create_config().times(1).returning(|| None);
        facility.expect_release().never();
        let result = CaptureRequest::create(&facility, CaptureFlags::STRESS);
        assert!(matches!(result, Err(CaptureError::ConfigCreate)));
    }
}
