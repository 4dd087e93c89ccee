/*!
 * Procfs Snapshot Facility
 * Whole-system process/thread snapshot built from /proc
 *
 * Honors the stackshot contract on Linux:
 * - BUSY while another capture on the same facility is in flight
 * - TIMED_OUT when a walk runs past its deadline
 * - processes and threads that exit mid-walk are skipped, not errors
 */

use crate::capture::traits::CaptureFacility;
use crate::capture::types::{CaptureFlags, CaptureStatus, ConfigHandle};
use crate::core::limits::PROCFS_WALK_DEADLINE;
use nix::errno::Errno;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One thread as seen in `task/<tid>/stat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSnapshot {
    pub tid: u32,
    pub state: char,
}

/// One process and its threads
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub command: String,
    pub threads: Vec<ThreadSnapshot>,
    /// Mapped regions, when load info was requested and readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapped_regions: Option<usize>,
}

/// Global memory counters from `meminfo`, in KiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalMemStats {
    pub total_kib: u64,
    pub free_kib: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_kib: Option<u64>,
}

/// A full system snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemSnapshot {
    pub processes: Vec<ProcessSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<GlobalMemStats>,
}

impl SystemSnapshot {
    pub fn thread_count(&self) -> usize {
        self.processes.iter().map(|p| p.threads.len()).sum()
    }
}

impl fmt::Display for SystemSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(mem) = &self.memory {
            writeln!(f, "mem total={}KiB free={}KiB", mem.total_kib, mem.free_kib)?;
        }
        for process in &self.processes {
            write!(f, "{} {}", process.pid, process.command)?;
            for thread in &process.threads {
                write!(f, " {}:{}", thread.tid, thread.state)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Why a walk did not produce a snapshot
#[derive(Debug)]
enum WalkError {
    Deadline,
    Io(io::Error),
}

impl From<io::Error> for WalkError {
    fn from(e: io::Error) -> Self {
        WalkError::Io(e)
    }
}

impl WalkError {
    fn status(&self) -> CaptureStatus {
        match self {
            WalkError::Deadline => CaptureStatus::TimedOut,
            WalkError::Io(e) => {
                CaptureStatus::Error(e.raw_os_error().unwrap_or(Errno::EIO as i32))
            }
        }
    }
}

/// Entry disappeared because its process or thread exited
fn is_vanished(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(Errno::ESRCH as i32)
}

/// Procfs-backed capture facility
pub struct ProcfsFacility {
    root: PathBuf,
    deadline: Duration,
    in_flight: Mutex<()>,
    configs: Mutex<HashMap<usize, CaptureFlags>>,
    next_handle: AtomicUsize,
    last_snapshot_len: AtomicUsize,
}

impl ProcfsFacility {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Facility reading from an alternate procfs mount
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        info!(root = %root.display(), "procfs snapshot facility ready");
        Self {
            root,
            deadline: PROCFS_WALK_DEADLINE,
            in_flight: Mutex::new(()),
            configs: Mutex::new(HashMap::new()),
            next_handle: AtomicUsize::new(1),
            last_snapshot_len: AtomicUsize::new(0),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Encoded size of the most recent snapshot
    pub fn last_snapshot_len(&self) -> usize {
        self.last_snapshot_len.load(Ordering::Relaxed)
    }

    /// Configurations created but not yet released
    pub fn live_configs(&self) -> usize {
        self.configs.lock().len()
    }

    /// Walk the process table
    pub fn snapshot(&self, flags: CaptureFlags) -> io::Result<SystemSnapshot> {
        match self.walk(flags, Instant::now()) {
            Ok(snapshot) => Ok(snapshot),
            Err(WalkError::Io(e)) => Err(e),
            Err(WalkError::Deadline) => Err(io::Error::from_raw_os_error(Errno::ETIMEDOUT as i32)),
        }
    }

    fn walk(&self, flags: CaptureFlags, started: Instant) -> Result<SystemSnapshot, WalkError> {
        let mut snapshot = SystemSnapshot::default();

        for entry in fs::read_dir(&self.root)? {
            if started.elapsed() >= self.deadline {
                return Err(WalkError::Deadline);
            }

            let entry = entry?;
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };

            match self.read_process(&entry.path(), pid, flags) {
                Ok(process) => snapshot.processes.push(process),
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if flags.contains(CaptureFlags::GET_GLOBAL_MEM_STATS) {
            snapshot.memory = Some(self.read_meminfo()?);
        }

        snapshot.processes.sort_by_key(|p| p.pid);
        Ok(snapshot)
    }

    fn read_process(
        &self,
        dir: &Path,
        pid: u32,
        flags: CaptureFlags,
    ) -> io::Result<ProcessSnapshot> {
        let command = fs::read_to_string(dir.join("comm"))?.trim_end().to_string();

        let mut threads = Vec::new();
        for task in fs::read_dir(dir.join("task"))? {
            let task = task?;
            let Some(tid) = task.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            match fs::read_to_string(task.path().join("stat")) {
                Ok(stat) => threads.push(ThreadSnapshot {
                    tid,
                    state: parse_stat_state(&stat).unwrap_or('?'),
                }),
                Err(e) if is_vanished(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        threads.sort_by_key(|t| t.tid);

        let mapped_regions = if flags.contains(CaptureFlags::SAVE_LOADINFO) {
            match fs::read_to_string(dir.join("maps")) {
                Ok(maps) => Some(maps.lines().count()),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => None,
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        Ok(ProcessSnapshot {
            pid,
            command,
            threads,
            mapped_regions,
        })
    }

    fn read_meminfo(&self) -> io::Result<GlobalMemStats> {
        let raw = fs::read_to_string(self.root.join("meminfo"))?;
        Ok(parse_meminfo(&raw))
    }

    fn encode(snapshot: &SystemSnapshot, flags: CaptureFlags) -> Result<Vec<u8>, CaptureStatus> {
        if flags.contains(CaptureFlags::KCDATA_FORMAT) {
            serde_json::to_vec(snapshot).map_err(|_| CaptureStatus::Error(Errno::EIO as i32))
        } else {
            Ok(snapshot.to_string().into_bytes())
        }
    }
}

impl Default for ProcfsFacility {
    fn default() -> Self {
        Self::new()
    }
}

/// State letter from a `stat` line; the command may itself contain parentheses
fn parse_stat_state(stat: &str) -> Option<char> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    after_comm.trim_start().chars().next()
}

fn parse_meminfo(raw: &str) -> GlobalMemStats {
    let mut stats = GlobalMemStats::default();
    for line in raw.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };
        match key {
            "MemTotal:" => stats.total_kib = value,
            "MemFree:" => stats.free_kib = value,
            "MemAvailable:" => stats.available_kib = Some(value),
            _ => {}
        }
    }
    stats
}

impl CaptureFacility for ProcfsFacility {
    fn create_config(&self) -> Option<ConfigHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.configs.lock().insert(id, CaptureFlags::empty());
        Some(ConfigHandle::from_raw(id))
    }

    fn set_flags(&self, config: &ConfigHandle, flags: CaptureFlags) -> CaptureStatus {
        match self.configs.lock().get_mut(&config.as_raw()) {
            Some(slot) => {
                *slot = flags;
                CaptureStatus::Ok
            }
            None => CaptureStatus::Error(Errno::EINVAL as i32),
        }
    }

    fn submit(&self, config: &ConfigHandle) -> CaptureStatus {
        let Some(flags) = self.configs.lock().get(&config.as_raw()).copied() else {
            return CaptureStatus::Error(Errno::EINVAL as i32);
        };
        let Some(_in_flight) = self.in_flight.try_lock() else {
            return CaptureStatus::Busy;
        };

        let started = Instant::now();
        let snapshot = match self.walk(flags, started) {
            Ok(snapshot) => snapshot,
            Err(e) => return e.status(),
        };

        match Self::encode(&snapshot, flags) {
            Ok(bytes) => {
                self.last_snapshot_len.store(bytes.len(), Ordering::Relaxed);
                debug!(
                    processes = snapshot.processes.len(),
                    threads = snapshot.thread_count(),
                    bytes = bytes.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "procfs snapshot taken"
                );
                CaptureStatus::Ok
            }
            Err(status) => status,
        }
    }

    fn release(&self, config: ConfigHandle) -> CaptureStatus {
        match self.configs.lock().remove(&config.as_raw()) {
            Some(_) => CaptureStatus::Ok,
            None => CaptureStatus::Error(Errno::EINVAL as i32),
        }
    }

    fn name(&self) -> &'static str {
        "procfs"
    }
}
