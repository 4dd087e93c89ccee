/*!
 * Capture Traits
 * Request/response contract of a system snapshot facility
 */

use super::types::{CaptureFlags, CaptureStatus, ConfigHandle};

/// System snapshot facility
///
/// Every status is a raw facility verdict; classification into
/// retryable and fatal happens in the client.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureFacility: Send + Sync {
    /// Allocate a capture configuration, `None` when the facility is out of resources
    fn create_config(&self) -> Option<ConfigHandle>;

    /// Set the requested data categories on a configuration
    fn set_flags(&self, config: &ConfigHandle, flags: CaptureFlags) -> CaptureStatus;

    /// Take one snapshot with the given configuration (may block)
    fn submit(&self, config: &ConfigHandle) -> CaptureStatus;

    /// Free a configuration and any snapshot buffer attached to it
    fn release(&self, config: ConfigHandle) -> CaptureStatus;

    /// Short facility name for logs
    fn name(&self) -> &'static str;
}
