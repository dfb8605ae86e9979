//! Readings every platform gets from `sysinfo`.

use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System, UpdateKind,
};

use crate::types::{CpuIdentity, DiskUsage, MemoryInfo, ProcessSample};

const MHZ: u64 = 1_000_000;

pub struct SysinfoSource {
    system: System,
    disks: Disks,
    identity: CpuIdentity,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        system.refresh_cpu_all();

        let identity = read_identity(&system);
        tracing::debug!(
            vendor = %identity.vendor,
            model = %identity.model,
            physical = identity.physical_cores,
            logical = identity.logical_cores,
            "Detected processor"
        );

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            identity,
        }
    }

    pub fn identity(&self) -> &CpuIdentity {
        &self.identity
    }

    /// System-wide and per-core usage in percent since the previous call.
    pub fn cpu_usage(&mut self) -> (f32, Vec<f32>) {
        self.system.refresh_cpu_usage();
        let per_core = self.system.cpus().iter().map(|cpu| cpu.cpu_usage()).collect();
        (self.system.global_cpu_usage(), per_core)
    }

    /// Current clock of each logical core in Hz.
    pub fn core_frequencies_hz(&mut self) -> Vec<u64> {
        self.system.refresh_cpu_frequency();
        self.system
            .cpus()
            .iter()
            .map(|cpu| cpu.frequency() * MHZ)
            .collect()
    }

    pub fn processes(&mut self) -> Vec<ProcessSample> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_exe(UpdateKind::OnlyIfNotSet),
        );

        self.system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessSample {
                pid: pid.as_u32(),
                name: process.name().to_string_lossy().to_string(),
                path: process.exe().map(|p| p.to_path_buf()),
                cpu_time_ms: process.accumulated_cpu_time(),
                rank_hint: process.cpu_usage(),
            })
            .collect()
    }

    pub fn memory(&mut self) -> MemoryInfo {
        self.system.refresh_memory();
        MemoryInfo {
            total_bytes: self.system.total_memory(),
            available_bytes: self.system.available_memory(),
            swap_total_bytes: self.system.total_swap(),
            swap_used_bytes: self.system.used_swap(),
        }
    }

    pub fn disks(&mut self) -> Vec<DiskUsage> {
        self.disks.refresh(true);
        self.disks
            .iter()
            .map(|disk| DiskUsage {
                name: disk.name().to_string_lossy().to_string(),
                file_system: disk.file_system().to_string_lossy().to_string(),
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
            .collect()
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

fn read_identity(system: &System) -> CpuIdentity {
    let cpus = system.cpus();
    let logical_cores = cpus.len().max(1);
    let physical_cores = System::physical_core_count()
        .unwrap_or(logical_cores)
        .clamp(1, logical_cores);

    let (vendor, model) = cpus
        .first()
        .map(|cpu| (cpu.vendor_id().to_string(), cpu.brand().trim().to_string()))
        .unwrap_or_default();

    CpuIdentity {
        vendor,
        model,
        physical_cores,
        logical_cores,
    }
}
