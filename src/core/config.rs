/*!
 * Run Configuration
 * Host-class workload sizing, env/file overrides and invocation parsing
 */

use super::errors::{HarnessError, HarnessResult};
use super::limits::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMicroSeconds};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming an optional JSON config file
pub const ENV_CONFIG_FILE: &str = "STRESS_CONFIG";
/// Environment override for the host class
pub const ENV_HOST_CLASS: &str = "STRESS_HOST_CLASS";
/// Environment override for the spawn iteration budget
pub const ENV_SPAWN_ITERATIONS: &str = "STRESS_SPAWN_ITERATIONS";
/// Environment override for the reap batch size
pub const ENV_REAP_INTERVAL: &str = "STRESS_REAP_INTERVAL";

/// Capability class of the host, used to size the spawn workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostClass {
    /// Constrained wearable hardware
    Watch,
    /// Phone-class hardware
    Phone,
    /// Full-capability desktop or server
    Desktop,
}

impl HostClass {
    /// Host class of the compile target
    pub fn detect() -> Self {
        if cfg!(target_os = "watchos") {
            HostClass::Watch
        } else if cfg!(target_os = "ios") {
            HostClass::Phone
        } else {
            HostClass::Desktop
        }
    }

    /// Spawn iteration budget for this class
    pub const fn spawn_iterations(self) -> u64 {
        match self {
            HostClass::Watch => WATCH_SPAWN_ITERATIONS,
            HostClass::Phone => PHONE_SPAWN_ITERATIONS,
            HostClass::Desktop => DESKTOP_SPAWN_ITERATIONS,
        }
    }
}

impl FromStr for HostClass {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "watch" => Ok(HostClass::Watch),
            "phone" => Ok(HostClass::Phone),
            "desktop" => Ok(HostClass::Desktop),
            other => Err(HarnessError::InvalidConfig(format!(
                "unknown host class '{}' (expected watch, phone or desktop)",
                other
            ))),
        }
    }
}

/// Configuration for one stress run
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case", deny_unknown_fields)]
pub struct HarnessConfig {
    pub host_class: HostClass,
    /// Explicit budget; falls back to the host class budget when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_iterations: Option<u64>,
    pub reap_threshold: usize,
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    pub capture_interval: Duration,
    /// Worker executable; the running executable when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_path: Option<PathBuf>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            host_class: HostClass::detect(),
            spawn_iterations: None,
            reap_threshold: REAP_INTERVAL,
            capture_interval: CAPTURE_INTERVAL,
            worker_path: None,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host_class(mut self, host_class: HostClass) -> Self {
        self.host_class = host_class;
        self
    }

    pub fn with_spawn_iterations(mut self, iterations: u64) -> Self {
        self.spawn_iterations = Some(iterations);
        self
    }

    pub fn with_reap_threshold(mut self, threshold: usize) -> Self {
        self.reap_threshold = threshold;
        self
    }

    pub fn with_capture_interval(mut self, interval: Duration) -> Self {
        self.capture_interval = interval;
        self
    }

    pub fn with_worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    /// Effective spawn iteration budget
    pub fn spawn_budget(&self) -> u64 {
        self.spawn_iterations
            .unwrap_or_else(|| self.host_class.spawn_iterations())
    }

    /// Effective worker executable
    pub fn resolve_worker_path(&self) -> HarnessResult<PathBuf> {
        match &self.worker_path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().map_err(|e| {
                HarnessError::InvalidConfig(format!("cannot resolve own executable: {}", e))
            }),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Defaults, then the file named by `STRESS_CONFIG`, then individual overrides.
    pub fn from_lookup<F>(lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Self::load_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(class) = lookup(ENV_HOST_CLASS) {
            config.host_class = class.parse()?;
        }
        if let Some(iterations) = lookup(ENV_SPAWN_ITERATIONS) {
            config.spawn_iterations = Some(parse_number(ENV_SPAWN_ITERATIONS, &iterations)?);
        }
        if let Some(interval) = lookup(ENV_REAP_INTERVAL) {
            config.reap_threshold = parse_number(ENV_REAP_INTERVAL, &interval)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file
    pub fn load_file(path: &Path) -> HarnessResult<Self> {
        let file_error = |reason: String| HarnessError::ConfigFile {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| file_error(e.to_string()))
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.reap_threshold == 0 {
            return Err(HarnessError::InvalidConfig(
                "reap_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> HarnessResult<T> {
    raw.trim().parse().map_err(|_| {
        HarnessError::InvalidConfig(format!("{} is not a valid number: '{}'", key, raw))
    })
}

/// Role selected by the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// Start the capture loop and drive the spawn/reap loop
    Orchestrator,
    /// Act as a short-lived churn worker
    Worker,
}

impl Invocation {
    /// Parse arguments, excluding the program name
    pub fn parse<I, S>(args: I) -> HarnessResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<String> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_string_lossy().into_owned())
            .collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match args.as_slice() {
            [] => Ok(Invocation::Orchestrator),
            [flag] if *flag == WORKER_FLAG => Ok(Invocation::Worker),
            ["-n", helper] if *helper == WORKER_HELPER_NAME => Ok(Invocation::Worker),
            other => Err(HarnessError::InvalidInvocation(other.join(" "))),
        }
    }

    /// Arguments that select the worker role in a child
    pub fn worker_args() -> [&'static str; 1] {
        [WORKER_FLAG]
    }
}
