//! Worker capability record: the hardware and adapter surface a worker
//! advertises at registration. Immutable for the lifetime of a session.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub storage: StorageInfo,
    #[serde(default)]
    pub gpus: Vec<GpuInfo>,
    /// Named adapters this worker can execute (`docker`, `llm-inference`, ...).
    pub adapters: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuInfo {
    pub model: String,
    pub cores: u32,
    pub threads: u32,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub available_mb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub total_gb: u64,
    pub available_gb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuInfo {
    pub vendor: GpuVendor,
    pub model: String,
    pub vram_mb: u64,
    pub supports: HashSet<ComputeApi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Apple,
    Intel,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeApi {
    Cuda,
    Rocm,
    Vulkan,
    Metal,
    Opencl,
}

/// Per-session caps on how much of the advertised hardware a job may use.
/// Absent fields mean "no cap" — the full capability record applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_cores: Option<u32>,
    pub ram_percent: Option<f32>,
    pub storage_gb: Option<u64>,
    /// Cap on VRAM percent, applied uniformly to every GPU in the record.
    pub gpu_vram_percent: Option<f32>,
}

impl CapabilityRecord {
    /// CPU cores available to a job after `limits.cpu_cores` is applied.
    pub fn effective_cpu_cores(&self, limits: &ResourceLimits) -> u32 {
        match limits.cpu_cores {
            Some(capped) => capped.min(self.cpu.cores),
            None => self.cpu.cores,
        }
    }

    /// RAM in MB available to a job after `limits.ram_percent` is applied.
    pub fn effective_memory_mb(&self, limits: &ResourceLimits) -> u64 {
        match limits.ram_percent {
            Some(pct) => ((self.memory.available_mb as f64) * (pct as f64 / 100.0)) as u64,
            None => self.memory.available_mb,
        }
    }

    /// VRAM in MB available to a job for a single GPU after
    /// `limits.gpu_vram_percent` is applied.
    pub fn effective_vram_mb(&self, gpu: &GpuInfo, limits: &ResourceLimits) -> u64 {
        match limits.gpu_vram_percent {
            Some(pct) => ((gpu.vram_mb as f64) * (pct as f64 / 100.0)) as u64,
            None => gpu.vram_mb,
        }
    }
}
