use std::fmt;

use crate::distributed::{ProcessConfig, DEVICE};

/// Compute device the generator is asked to run on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Device {
    Cuda,
    Metal,
    Cpu,

    /// No preference, the inference server decides placement
    Auto,

    /// Any other selector passed through `DEVICE`, e.g. "xpu" or "cuda:1"
    Named(String),
}

impl Device {
    /// Pick the device for this process.
    /// An explicit `DEVICE` entry wins, otherwise the accelerator this binary was built for is used.
    /// A build without the `cuda` or `metal` feature yields `Auto` rather than pinning work to the cpu.
    pub fn select(config: &ProcessConfig) -> Self {
        if let Some(device) = config.get(DEVICE) {
            return Device::from(device);
        }
        Self::detect()
    }

    /// candle reports accelerator support decided at compile time
    fn detect() -> Self {
        if candle_core::utils::cuda_is_available() {
            Device::Cuda
        } else if candle_core::utils::metal_is_available() {
            Device::Metal
        } else {
            Device::Auto
        }
    }

    /// Whether this device pins generation to the cpu
    pub fn is_cpu(&self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl From<&str> for Device {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "cuda" => Device::Cuda,
            "metal" | "mps" => Device::Metal,
            "cpu" => Device::Cpu,
            "auto" => Device::Auto,
            _ => Device::Named(value.trim().to_string()),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cuda => write!(f, "cuda"),
            Device::Metal => write!(f, "metal"),
            Device::Cpu => write!(f, "cpu"),
            Device::Auto => write!(f, "auto"),
            Device::Named(name) => write!(f, "{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_override_wins() {
        let config = ProcessConfig::from_pairs([(DEVICE, "xpu")]);
        assert_eq!(Device::select(&config), Device::Named("xpu".to_string()));

        let config = ProcessConfig::from_pairs([(DEVICE, "CPU")]);
        assert_eq!(Device::select(&config), Device::Cpu);
    }

    #[test]
    fn test_device_parse_and_display() {
        assert_eq!(Device::from("cuda"), Device::Cuda);
        assert_eq!(Device::from("mps"), Device::Metal);
        assert_eq!(Device::from(" cuda:1 ").to_string(), "cuda:1");
        assert_eq!(Device::Metal.to_string(), "metal");
    }

    #[test]
    fn test_detection_never_pins_to_cpu() {
        let device = Device::select(&ProcessConfig::default());
        assert!(!device.is_cpu());
        assert!(!matches!(device, Device::Named(_)));
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn test_build_without_accelerator_leaves_placement_to_server() {
        assert_eq!(Device::select(&ProcessConfig::default()), Device::Auto);
    }

    #[test]
    fn test_explicit_cpu_is_pinned() {
        let config = ProcessConfig::from_pairs([(DEVICE, "cpu")]);
        assert!(Device::select(&config).is_cpu());
        assert_eq!(Device::from("auto"), Device::Auto);
    }
}
