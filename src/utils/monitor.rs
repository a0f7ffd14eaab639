#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, RefreshKind, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub peak_memory_mb: u64,
    pub uptime: Duration,
}

/// Samples this process's CPU and memory between analysis phases.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    peak_memory_mb: Mutex<u64>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => Some(pid),
                Err(e) => {
                    tracing::warn!("process monitoring unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let system = if pid.is_some() {
            System::new_with_specifics(RefreshKind::everything())
        } else {
            System::new()
        };

        Self {
            system: Mutex::new(system),
            pid,
            started: Instant::now(),
            peak_memory_mb: Mutex::new(0),
            enabled: pid.is_some(),
        }
    }

    pub fn get_stats(&self) -> Option<SystemStats> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;

        let mut peak = self.peak_memory_mb.lock().ok()?;
        *peak = (*peak).max(memory_mb);

        Some(SystemStats {
            cpu_usage: process.cpu_usage(),
            memory_usage_mb: memory_mb,
            peak_memory_mb: *peak,
            uptime: self.started.elapsed(),
        })
    }

    pub fn log_phase(&self, phase: &str, elapsed: Duration) {
        if let Some(stats) = self.get_stats() {
            tracing::info!(
                phase,
                elapsed_ms = elapsed.as_millis() as u64,
                cpu = format!("{:.1}%", stats.cpu_usage),
                memory_mb = stats.memory_usage_mb,
                peak_memory_mb = stats.peak_memory_mb,
                uptime_s = stats.uptime.as_secs(),
                "phase complete"
            );
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_phase(&self, _phase: &str, _elapsed: std::time::Duration) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
