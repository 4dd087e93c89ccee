/*!
 * Core Module
 * Error handling, constants and run configuration
 */

pub mod config;
pub mod errors;
pub mod limits;

// Re-export for convenience
pub use config::{HarnessConfig, HostClass, Invocation};
pub use errors::*;
