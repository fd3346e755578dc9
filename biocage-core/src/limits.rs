//! Resource constraints applied to every sandbox container.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Smallest memory limit the container runtime accepts.
const MIN_MEMORY_BYTES: u64 = 6 * MIB;

/// A container memory ceiling, parsed from `<n>[b|k|m|g]` (case-insensitive).
///
/// A bare number is taken as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub struct MemoryLimit {
    bytes: u64,
}

impl MemoryLimit {
    /// Creates a limit of exactly `bytes`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidMemoryLimit`] below the 6 MiB runtime minimum.
    pub fn from_bytes(bytes: u64) -> Result<Self, CoreError> {
        if bytes < MIN_MEMORY_BYTES {
            return Err(CoreError::InvalidMemoryLimit {
                value: bytes.to_string(),
                reason: "must be at least 6m".to_owned(),
            });
        }
        Ok(Self { bytes })
    }

    /// Creates a limit of `mib` mebibytes.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidMemoryLimit`] below the runtime minimum or on overflow.
    pub fn from_mib(mib: u64) -> Result<Self, CoreError> {
        let bytes = mib.checked_mul(MIB).ok_or_else(|| CoreError::InvalidMemoryLimit {
            value: format!("{mib}m"),
            reason: "overflows u64".to_owned(),
        })?;
        Self::from_bytes(bytes)
    }

    #[must_use]
    pub fn bytes(self) -> u64 {
        self.bytes
    }
}

impl Default for MemoryLimit {
    fn default() -> Self {
        Self { bytes: 512 * MIB }
    }
}

impl FromStr for MemoryLimit {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidMemoryLimit {
            value: s.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);
        if digits.is_empty() {
            return Err(invalid("expected a number followed by an optional b/k/m/g unit"));
        }

        let multiplier = match unit.to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kb" => KIB,
            "m" | "mb" => MIB,
            "g" | "gb" => GIB,
            _ => return Err(invalid("unknown unit")),
        };

        let value: u64 = digits.parse().map_err(|_| invalid("number out of range"))?;
        let bytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| invalid("overflows u64"))?;
        Self::from_bytes(bytes).map_err(|_| invalid("must be at least 6m"))
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemoryLimit> for String {
    fn from(limit: MemoryLimit) -> Self {
        limit.to_string()
    }
}

/// Renders in the largest unit that divides the byte count exactly.
impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.bytes;
        if b % GIB == 0 {
            write!(f, "{}g", b / GIB)
        } else if b % MIB == 0 {
            write!(f, "{}m", b / MIB)
        } else if b % KIB == 0 {
            write!(f, "{}k", b / KIB)
        } else {
            write!(f, "{b}b")
        }
    }
}

/// Number of CPUs a container may use (fractional allowed).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
#[non_exhaustive]
pub struct CpuLimit(f64);

impl CpuLimit {
    /// Creates a CPU limit.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidCpuLimit`] for non-finite or non-positive values.
    pub fn new(cpus: f64) -> Result<Self, CoreError> {
        if !cpus.is_finite() || cpus <= 0.0 {
            return Err(CoreError::InvalidCpuLimit { value: cpus });
        }
        Ok(Self(cpus))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for CpuLimit {
    fn default() -> Self {
        Self(1.0)
    }
}

impl TryFrom<f64> for CpuLimit {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CpuLimit> for f64 {
    fn from(limit: CpuLimit) -> Self {
        limit.0
    }
}

impl fmt::Display for CpuLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Memory, CPU and network settings for one container launch.
///
/// Defaults: 512 MiB, one CPU, network disabled.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct ResourceLimits {
    pub memory: MemoryLimit,
    pub cpus: CpuLimit,
    /// Networking is disabled unless this is set.
    pub network_access: bool,
}

impl ResourceLimits {
    #[must_use]
    pub fn new(memory: MemoryLimit, cpus: CpuLimit, network_access: bool) -> Self {
        Self { memory, cpus, network_access }
    }
}
