//! Environment report
//!
//! Snapshot of the host the pipeline runs on, logged at startup so a run's
//! numbers can be read against the machine that produced them.

use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::info;

/// Host and runtime facts at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentReport {
    /// Crate version
    pub version: String,
    pub os: String,
    pub os_version: String,
    /// Logical CPUs
    pub cpu_count: usize,
    pub physical_cores: Option<usize>,
    pub total_memory_mb: f64,
    pub available_memory_mb: f64,
    /// Threads in the global rayon pool
    pub rayon_threads: usize,
    /// Seconds since UNIX epoch
    pub timestamp: f64,
}

impl EnvironmentReport {
    /// Collect a fresh snapshot
    pub fn collect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        Self {
            version: crate::VERSION.to_string(),
            os: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::os_version().unwrap_or_default(),
            cpu_count: sys.cpus().len(),
            physical_cores: sys.physical_core_count(),
            total_memory_mb: sys.total_memory() as f64 / (1024.0 * 1024.0),
            available_memory_mb: sys.available_memory() as f64 / (1024.0 * 1024.0),
            rayon_threads: rayon::current_num_threads(),
            timestamp,
        }
    }

    /// Lines for terminal output
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("version", self.version.clone()),
            ("os", format!("{} {}", self.os, self.os_version).trim().to_string()),
            ("cpus", self.cpu_count.to_string()),
            (
                "physical cores",
                self.physical_cores
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
            ("memory total", format!("{:.0} MB", self.total_memory_mb)),
            ("memory available", format!("{:.0} MB", self.available_memory_mb)),
            ("rayon threads", self.rayon_threads.to_string()),
        ]
    }
}

/// Collect the environment report and emit it as a `tracing` event.
///
/// Never fails; fields sysinfo cannot read are left empty.
pub fn report_environment() -> EnvironmentReport {
    let report = EnvironmentReport::collect();
    info!(
        version = %report.version,
        os = %report.os,
        os_version = %report.os_version,
        cpus = report.cpu_count,
        total_memory_mb = report.total_memory_mb,
        available_memory_mb = report.available_memory_mb,
        rayon_threads = report.rayon_threads,
        "environment"
    );
    report
}
