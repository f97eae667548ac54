use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use sysinfo::{Disks, ProcessesToUpdate, System};

use crate::config::ResourceQuotas;

/// Advisory policy check sampled before each tool dispatch: refuse work
/// when the host is already saturated rather than make it worse.
///
/// The disk probe targets the filesystem the workspace lives on; other
/// mounts (tmpfs and friends) reporting ample space must not mask a full
/// workspace disk.
pub struct ResourceMonitor {
    quotas: ResourceQuotas,
    workspace: PathBuf,
    system: Mutex<System>,
    enabled: bool,
}

impl ResourceMonitor {
    pub fn new(quotas: ResourceQuotas, workspace: PathBuf) -> Self {
        Self {
            quotas,
            workspace,
            system: Mutex::new(System::new()),
            enabled: true,
        }
    }

    /// Disable sampling; `check` then always passes. Used in tests and on
    /// platforms where sampling is unreliable.
    pub fn disabled(quotas: ResourceQuotas) -> Self {
        Self {
            quotas,
            workspace: PathBuf::from("."),
            system: Mutex::new(System::new()),
            enabled: false,
        }
    }

    /// Returns a violation description when a quota is exceeded.
    pub fn check(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let mut system = self.system.lock().expect("resource monitor poisoned");

        system.refresh_cpu_usage();
        let cpu = system.global_cpu_usage();
        if cpu > self.quotas.max_cpu_percent {
            return Some(format!(
                "CPU usage too high: {cpu:.1}% (max {}%)",
                self.quotas.max_cpu_percent
            ));
        }

        if let Ok(pid) = sysinfo::get_current_pid() {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                let memory_mb = process.memory() / (1024 * 1024);
                if memory_mb > self.quotas.max_memory_mb {
                    return Some(format!(
                        "Memory usage too high: {memory_mb}MB (max {}MB)",
                        self.quotas.max_memory_mb
                    ));
                }
            }
        }

        if let Some(free_mb) = self.free_disk_mb() {
            if free_mb < self.quotas.max_disk_mb {
                return Some(format!(
                    "Low disk space: {free_mb}MB free (min {}MB required)",
                    self.quotas.max_disk_mb
                ));
            }
        }

        None
    }

    pub fn stats(&self) -> HashMap<String, f64> {
        let mut stats = HashMap::new();
        if !self.enabled {
            return stats;
        }

        let mut system = self.system.lock().expect("resource monitor poisoned");
        system.refresh_cpu_usage();
        stats.insert("cpu_percent".into(), system.global_cpu_usage() as f64);

        if let Ok(pid) = sysinfo::get_current_pid() {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                stats.insert(
                    "memory_mb".into(),
                    process.memory() as f64 / (1024.0 * 1024.0),
                );
            }
        }

        if let Some(free_mb) = self.free_disk_mb() {
            stats.insert("disk_free_mb".into(), free_mb as f64);
        }

        stats
    }

    /// Available space on the filesystem containing the workspace: the
    /// disk whose mount point is the longest prefix of the workspace
    /// path. Falls back to the least-free disk when none matches.
    fn free_disk_mb(&self) -> Option<u64> {
        let disks = Disks::new_with_refreshed_list();
        let target = self
            .workspace
            .canonicalize()
            .unwrap_or_else(|_| self.workspace.clone());

        disks
            .list()
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space() / (1024 * 1024))
            .or_else(|| {
                disks
                    .list()
                    .iter()
                    .map(|disk| disk.available_space() / (1024 * 1024))
                    .min()
            })
    }
}
