/*!
 * Capture Module
 * Snapshot requests, retry policy and the background capture loop
 */

pub mod client;
pub mod facility;
pub mod request;
pub mod task;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use client::{CaptureClient, CaptureStats};
pub use facility::platform_default;
pub use request::CaptureRequest;
pub use task::{CaptureLoop, CaptureTask, FatalHandler};
pub use traits::CaptureFacility;
pub use types::{
    CaptureError, CaptureFlags, CaptureOutcome, CaptureResult, CaptureStatus, ConfigHandle,
};
