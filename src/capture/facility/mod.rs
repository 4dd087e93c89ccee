/*!
 * Capture Facilities
 * Platform implementations of the snapshot contract
 */

use super::traits::CaptureFacility;
use super::types::{CaptureResult, ConfigHandle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(target_vendor = "apple")]
pub mod darwin;
#[cfg(target_os = "linux")]
pub mod procfs;

#[cfg(target_vendor = "apple")]
pub use darwin::DarwinFacility;
#[cfg(target_os = "linux")]
pub use procfs::ProcfsFacility;

/// Kernel stackshot facility
#[cfg(target_vendor = "apple")]
pub fn platform_default() -> CaptureResult<Arc<dyn CaptureFacility>> {
    Ok(Arc::new(DarwinFacility::new()?))
}

/// Procfs walker standing in for stackshot
#[cfg(target_os = "linux")]
pub fn platform_default() -> CaptureResult<Arc<dyn CaptureFacility>> {
    Ok(Arc::new(ProcfsFacility::new()))
}

#[cfg(not(any(target_vendor = "apple", target_os = "linux")))]
pub fn platform_default() -> CaptureResult<Arc<dyn CaptureFacility>> {
    Err(super::types::CaptureError::Unsupported(
        std::env::consts::OS.to_string(),
    ))
}

/// Raw configuration values a facility handed out and has not yet freed
///
/// `ConfigHandle::from_raw` is public, so a facility must not trust a handle
/// it did not issue.
#[derive(Debug, Default)]
pub struct IssuedHandles {
    live: Mutex<HashSet<usize>>,
}

impl IssuedHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly allocated raw value and wrap it
    pub fn issue(&self, raw: usize) -> ConfigHandle {
        self.live.lock().insert(raw);
        ConfigHandle::from_raw(raw)
    }

    /// Whether `handle` is live and owned by this facility
    pub fn contains(&self, handle: &ConfigHandle) -> bool {
        self.live.lock().contains(&handle.as_raw())
    }

    /// Forget `handle`, returning its raw value only if it was live
    pub fn retire(&self, handle: ConfigHandle) -> Option<usize> {
        let raw = handle.as_raw();
        self.live.lock().remove(&raw).then_some(raw)
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forged_handle_is_rejected() {
        let issued = IssuedHandles::new();
        let handle = issued.issue(0x1000);

        assert!(issued.contains(&handle));
        assert!(!issued.contains(&ConfigHandle::from_raw(0xdead)));
        assert_eq!(issued.retire(ConfigHandle::from_raw(0xdead)), None);
        assert_eq!(issued.len(), 1);
    }

    #[test]
    fn test_handle_retires_once() {
        let issued = IssuedHandles::new();
        let handle = issued.issue(0x2000);

        assert_eq!(issued.retire(handle), Some(0x2000));
        assert!(issued.is_empty());
        assert_eq!(issued.retire(ConfigHandle::from_raw(0x2000)), None);
    }
}
