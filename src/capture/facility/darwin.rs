/*!
 * Darwin Stackshot Facility
 * FFI binding to the libsystem stackshot config API
 */

use super::IssuedHandles;
use crate::capture::traits::CaptureFacility;
use crate::capture::types::{
    CaptureError, CaptureFlags, CaptureResult, CaptureStatus, ConfigHandle,
};
use nix::errno::Errno;
use nix::unistd::geteuid;
use std::ffi::{c_int, c_void};
use tracing::info;

extern "C" {
    fn stackshot_config_create() -> *mut c_void;
    fn stackshot_config_set_flags(config: *mut c_void, flags: u64) -> c_int;
    fn stackshot_capture_with_config(config: *mut c_void) -> c_int;
    fn stackshot_config_dealloc(config: *mut c_void) -> c_int;
}

/// Kernel stackshot via `stackshot_capture_with_config`
///
/// Only root may take stackshots, so construction checks the effective uid.
/// Handles not issued by this facility are rejected with EINVAL before
/// reaching libsystem.
#[derive(Debug)]
pub struct DarwinFacility {
    issued: IssuedHandles,
}

impl DarwinFacility {
    pub fn new() -> CaptureResult<Self> {
        if !geteuid().is_root() {
            return Err(CaptureError::RequiresRoot);
        }
        info!("Darwin stackshot facility ready");
        Ok(Self {
            issued: IssuedHandles::new(),
        })
    }
}

fn raw_config(config: &ConfigHandle) -> *mut c_void {
    config.as_raw() as *mut c_void
}

fn invalid_handle() -> CaptureStatus {
    CaptureStatus::Error(Errno::EINVAL as i32)
}

impl CaptureFacility for DarwinFacility {
    fn create_config(&self) -> Option<ConfigHandle> {
        // SAFETY: no arguments; returns null when allocation fails
        let raw = unsafe { stackshot_config_create() };
        if raw.is_null() {
            None
        } else {
            Some(self.issued.issue(raw as usize))
        }
    }

    fn set_flags(&self, config: &ConfigHandle, flags: CaptureFlags) -> CaptureStatus {
        if !self.issued.contains(config) {
            return invalid_handle();
        }
        // SAFETY: handle is live in `issued`, so it came from stackshot_config_create
        // and has not been released
        let ret = unsafe { stackshot_config_set_flags(raw_config(config), flags.bits()) };
        CaptureStatus::from_raw(ret)
    }

    fn submit(&self, config: &ConfigHandle) -> CaptureStatus {
        if !self.issued.contains(config) {
            return invalid_handle();
        }
        // SAFETY: as above; the snapshot buffer stays owned by the config
        let ret = unsafe { stackshot_capture_with_config(raw_config(config)) };
        CaptureStatus::from_raw(ret)
    }

    fn release(&self, config: ConfigHandle) -> CaptureStatus {
        let Some(raw) = self.issued.retire(config) else {
            return invalid_handle();
        };
        // SAFETY: retire succeeds once per issued config, so this frees a live config once
        let ret = unsafe { stackshot_config_dealloc(raw as *mut c_void) };
        CaptureStatus::from_raw(ret)
    }

    fn name(&self) -> &'static str {
        "stackshot"
    }
}
