/*!
 * Capture Types
 * Request flags, facility status codes and outcome classification
 */

use miette::Diagnostic;
use nix::errno::Errno;
use std::fmt;
use thiserror::Error;

/// Capture operation result
pub type CaptureResult<T> = Result<T, CaptureError>;

bitflags::bitflags! {
    /// Data categories requested from the capture facility.
    ///
    /// Bit values match the kernel stackshot flag word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CaptureFlags: u64 {
        /// Include load-address info for user images
        const SAVE_LOADINFO          = 0x0000_0002;
        /// Include global memory statistics
        const GET_GLOBAL_MEM_STATS   = 0x0000_0004;
        /// Include importance-donating process identifiers
        const SAVE_IMP_DONATION_PIDS = 0x0000_2000;
        /// Encode the snapshot in the structured kcdata format
        const KCDATA_FORMAT          = 0x0001_0000;
    }
}

impl CaptureFlags {
    /// Fixed request set used by every stress capture
    pub const STRESS: Self = Self::SAVE_LOADINFO
        .union(Self::GET_GLOBAL_MEM_STATS)
        .union(Self::SAVE_IMP_DONATION_PIDS)
        .union(Self::KCDATA_FORMAT);
}

/// Status returned by a capture facility call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureStatus {
    Ok,
    /// Facility is capturing on behalf of someone else
    Busy,
    /// Facility gave up waiting for internal resources
    TimedOut,
    /// Any other errno
    Error(i32),
}

impl CaptureStatus {
    /// Map a raw facility return code (0 or errno)
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => CaptureStatus::Ok,
            c if c == Errno::EBUSY as i32 => CaptureStatus::Busy,
            c if c == Errno::ETIMEDOUT as i32 => CaptureStatus::TimedOut,
            other => CaptureStatus::Error(other),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CaptureStatus::Ok)
    }

    /// Contention that is expected to clear on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureStatus::Busy | CaptureStatus::TimedOut)
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Ok => write!(f, "OK"),
            CaptureStatus::Busy => write!(f, "EBUSY"),
            CaptureStatus::TimedOut => write!(f, "ETIMEDOUT"),
            CaptureStatus::Error(code) => {
                write!(f, "errno {} ({})", code, Errno::from_raw(*code).desc())
            }
        }
    }
}

/// Opaque capture configuration owned by a facility
///
/// Not `Clone`: releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfigHandle(usize);

impl ConfigHandle {
    pub fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// Classified result of a capture submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Success,
    TransientFailure(CaptureStatus),
    FatalFailure(CaptureError),
}

impl CaptureOutcome {
    /// Classify a single submission status
    pub fn classify(status: CaptureStatus) -> Self {
        match status {
            CaptureStatus::Ok => CaptureOutcome::Success,
            s if s.is_transient() => CaptureOutcome::TransientFailure(s),
            s => CaptureOutcome::FatalFailure(CaptureError::Submit { status: s }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CaptureOutcome::Success)
    }
}

/// Capture errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum CaptureError {
    #[error("Capture facility returned no configuration")]
    #[diagnostic(
        code(capture::config_create),
        help("The facility could not allocate a request. The host may be out of resources.")
    )]
    ConfigCreate,

    #[error("Setting capture flags {flags:#x} failed: {status}")]
    #[diagnostic(code(capture::set_flags))]
    SetFlags { flags: u64, status: CaptureStatus },

    #[error("Capture failed: {status}")]
    #[diagnostic(
        code(capture::submit),
        help("Only EBUSY and ETIMEDOUT are retried. Any other status is a facility bug.")
    )]
    Submit { status: CaptureStatus },

    #[error("Capture still failing after {attempts} attempts: {last}")]
    #[diagnostic(
        code(capture::retries_exhausted),
        help("The facility stayed contended for the whole retry budget.")
    )]
    RetriesExhausted { attempts: u32, last: CaptureStatus },

    #[error("Capture facility requires root privileges")]
    #[diagnostic(code(capture::requires_root), help("Re-run the harness as root."))]
    RequiresRoot,

    #[error("No capture facility on this platform: {0}")]
    #[diagnostic(code(capture::unsupported))]
    Unsupported(String),
}
