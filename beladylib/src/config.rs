use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::trace::{LookAhead, Radix, TraceOptions};

/// Geometry of a single cache. All three sizes are required so a cache is never silently mis-sized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Bytes per cache line
    #[serde(alias = "cache_line_size")]
    pub line_size: u64,
    /// Total size in bytes
    pub capacity: u64,
    /// Ways per set
    pub associativity: u64,
    /// Width of a physical address, wider addresses are rejected
    #[serde(default = "CacheConfig::default_address_bits")]
    pub address_bits: u32,
}

impl CacheConfig {
    pub fn new(line_size: u64, capacity: u64, associativity: u64) -> Self {
        Self {
            line_size,
            capacity,
            associativity,
            address_bits: Self::default_address_bits(),
        }
    }

    fn default_address_bits() -> u32 {
        u64::BITS
    }

    /// Validates the geometry, returning the number of sets
    pub fn num_sets(&self) -> Result<u64, ConfigError> {
        if self.line_size == 0 {
            return Err(ConfigError::Zero { field: "line_size" });
        }
        if self.capacity == 0 {
            return Err(ConfigError::Zero { field: "capacity" });
        }
        if self.associativity == 0 {
            return Err(ConfigError::Zero { field: "associativity" });
        }
        if self.address_bits == 0 || self.address_bits > u64::BITS {
            return Err(ConfigError::AddressBits(self.address_bits));
        }
        if self.address_bits < u64::BITS && self.line_size > 1 << self.address_bits {
            return Err(ConfigError::LineTooWide {
                line_size: self.line_size,
                address_bits: self.address_bits,
            });
        }
        let indivisible = || ConfigError::Indivisible {
            capacity: self.capacity,
            line_size: self.line_size,
            associativity: self.associativity,
        };
        let set_bytes = self.line_size.checked_mul(self.associativity).ok_or_else(indivisible)?;
        if self.capacity % set_bytes != 0 {
            return Err(indivisible());
        }
        Ok(self.capacity / set_bytes)
    }
}

/// The eviction policy to simulate. Defaults to Belady's optimal policy
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum PolicyConfig {
    #[default]
    #[serde(alias = "belady", alias = "opt")]
    #[value(alias = "opt")]
    Belady,
    #[serde(alias = "lru")]
    #[value(name = "lru")]
    LeastRecentlyUsed,
    #[serde(alias = "random")]
    Random,
}

/// Everything needed for one simulation run, usually parsed from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub cache: CacheConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Seed for the random policy
    #[serde(default)]
    pub seed: u64,
    /// Instructions executed by the traced program, used to normalise MPKI. Required
    pub instruction_count: u64,
    /// Accesses visible to the scorer, the whole trace when absent
    #[serde(default)]
    pub max_look_ahead: Option<usize>,
    #[serde(default)]
    pub radix: Radix,
    #[serde(default)]
    pub skip_header: bool,
}

impl SimulationConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Options for reading a trace to replay through this configuration. Addresses are aligned to
    /// the cache's line size, so the scorer and the cache agree on line addresses
    pub fn trace_options(&self) -> Result<TraceOptions, ConfigError> {
        Ok(TraceOptions::new(self.cache.line_size)?
            .with_look_ahead(LookAhead::from_config(self.max_look_ahead)?)
            .with_radix(self.radix)
            .with_skip_header(self.skip_header))
    }
}
