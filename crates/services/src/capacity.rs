//! Rough hardware sizing for running a model locally.
//!
//! Works on numbers the caller already has; nothing here probes the host.

use serde::{Deserialize, Serialize};

const BILLION: f64 = 1e9;

/// What the machine offers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub total_ram_gb: f64,
    /// VRAM of the first GPU, 0 when there is none.
    pub total_vram_gb: f64,
    pub cpu_cores: u32,
    pub cpu_max_mhz: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub parameter_count: f64,
    pub estimated_vram_gb: f64,
    pub estimated_ram_gb: f64,
    pub available_vram_gb: f64,
    pub available_ram_gb: f64,
    pub vram_status: String,
    pub ram_status: String,
    pub cpu_cores: u32,
    pub cpu_ghz: f64,
    pub cpu_status: String,
}

/// (vram, ram) in GB needed for a model of `parameter_count` parameters.
pub fn required_memory_gb(parameter_count: f64) -> (f64, f64) {
    let p = parameter_count / BILLION;
    if p <= 7.0 {
        (p * 2.0, p * 4.0)
    } else if p <= 27.0 {
        (2.0 + (p - 1.0) * 7.0, 4.0 + (p - 1.0) * 10.0)
    } else {
        // Same slope past 70B; requirements never shrink as models grow.
        (14.0 + (p - 27.0) * 14.0, 20.0 + (p - 27.0) * 20.0)
    }
}

fn memory_status(available: f64, required: f64) -> String {
    if available >= required {
        "Enough".to_string()
    } else {
        format!("Not enough (Shortfall: {:.2} GB)", required - available)
    }
}

pub fn estimate(profile: &HardwareProfile, parameter_count: f64) -> CapacityReport {
    let (vram, ram) = required_memory_gb(parameter_count);
    let cpu_ghz = profile.cpu_max_mhz / 1000.0;
    let cpu_status = if profile.cpu_cores >= 8 && cpu_ghz >= 3.0 {
        "Good for LLM inference"
    } else {
        "Might not be ideal for LLM performance"
    };

    CapacityReport {
        parameter_count,
        estimated_vram_gb: vram,
        estimated_ram_gb: ram,
        available_vram_gb: profile.total_vram_gb,
        available_ram_gb: profile.total_ram_gb,
        vram_status: memory_status(profile.total_vram_gb, vram),
        ram_status: memory_status(profile.total_ram_gb, ram),
        cpu_cores: profile.cpu_cores,
        cpu_ghz,
        cpu_status: cpu_status.to_string(),
    }
}

const OPTIMIZATION_NOTES: &str = "Optimization Techniques:
1. Use quantization to reduce memory requirements
2. Implement batch processing for better CPU utilization
3. Utilize optimized libraries (e.g., ONNX Runtime, TensorRT) for CPU inference
4. Ensure proper cooling to prevent CPU throttling during long inference sessions";

/// Upgrade advice for the given machine, always ending with general notes.
pub fn recommendations(profile: &HardwareProfile) -> Vec<String> {
    let mut advice = Vec::new();

    if profile.cpu_cores < 8 {
        advice.push(
            "CPU: Upgrade to a CPU with at least 8 cores for better parallel processing"
                .to_string(),
        );
    }
    if profile.cpu_max_mhz < 3000.0 {
        advice.push("CPU: Consider a CPU with a clock speed of at least 3.0 GHz".to_string());
    }

    if profile.total_ram_gb < 16.0 {
        advice.push("RAM: Upgrade to at least 16GB for models up to 2B parameters".to_string());
    } else if profile.total_ram_gb < 32.0 {
        advice.push("RAM: Upgrade to at least 32GB for models up to 7B parameters".to_string());
    } else if profile.total_ram_gb < 64.0 {
        advice.push("RAM: Upgrade to at least 64GB for models 13B and larger".to_string());
    }

    if profile.total_vram_gb > 0.0 && profile.total_vram_gb < 4.0 {
        advice.push("GPU: Consider a GPU with at least 4GB of VRAM".to_string());
    }

    advice.push(OPTIMIZATION_NOTES.to_string());
    advice
}
