//! Capability gate: platform support checks performed before any native
//! codec call. Pure functions of (operating system, CPU architecture); no
//! I/O, never panics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system component of a capability key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Windows,
    Linux,
    MacOs,
    Unknown,
}

impl OperatingSystem {
    pub const ALL: [OperatingSystem; 4] = [
        OperatingSystem::Windows,
        OperatingSystem::Linux,
        OperatingSystem::MacOs,
        OperatingSystem::Unknown,
    ];

    fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// CPU architecture component of a capability key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CpuArch {
    Amd64,
    Arm64,
    Arm32,
    Unknown,
}

impl CpuArch {
    pub const ALL: [CpuArch; 4] = [
        CpuArch::Amd64,
        CpuArch::Arm64,
        CpuArch::Arm32,
        CpuArch::Unknown,
    ];

    fn detect() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::Amd64
        } else if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "arm") {
            Self::Arm32
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for CpuArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm32 => "arm32",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// (OS, architecture) pair used to query codec support. Pure value, no
/// lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CapabilityKey {
    pub os: OperatingSystem,
    pub arch: CpuArch,
}

impl CapabilityKey {
    pub const fn new(os: OperatingSystem, arch: CpuArch) -> Self {
        Self { os, arch }
    }

    /// Detects the key for the platform this binary was compiled for.
    pub fn detect() -> Self {
        Self::new(OperatingSystem::detect(), CpuArch::detect())
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Platforms the Basis Universal native wrapper library ships for.
pub const BASIS_SUPPORTED: &[CapabilityKey] = &[
    CapabilityKey::new(OperatingSystem::Windows, CpuArch::Amd64),
    CapabilityKey::new(OperatingSystem::Linux, CpuArch::Amd64),
    CapabilityKey::new(OperatingSystem::Linux, CpuArch::Arm32),
    CapabilityKey::new(OperatingSystem::Linux, CpuArch::Arm64),
    CapabilityKey::new(OperatingSystem::MacOs, CpuArch::Amd64),
    CapabilityKey::new(OperatingSystem::MacOs, CpuArch::Arm64),
];

/// Returns true if the Basis Universal codec is available on `key`.
pub fn basis_supported(key: CapabilityKey) -> bool {
    BASIS_SUPPORTED.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_is_not_unknown_on_tier1_targets() {
        let key = CapabilityKey::detect();
        if cfg!(any(target_os = "windows", target_os = "linux", target_os = "macos")) {
            assert_ne!(key.os, OperatingSystem::Unknown);
        }
        if cfg!(any(target_arch = "x86_64", target_arch = "aarch64")) {
            assert_ne!(key.arch, CpuArch::Unknown);
        }
    }

    #[test]
    fn display_is_slash_separated() {
        let key = CapabilityKey::new(OperatingSystem::Linux, CpuArch::Arm64);
        assert_eq!(key.to_string(), "linux/arm64");
    }
}
