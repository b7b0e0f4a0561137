use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::trace::Access;

/// Rejected cache or simulation configuration. Always fatal, there is nothing to retry
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid cache configuration: {field} must be non-zero")]
    Zero { field: &'static str },

    #[error(
        "invalid cache configuration: capacity {capacity} is not a multiple of \
         line_size * associativity ({line_size} * {associativity})"
    )]
    Indivisible {
        capacity: u64,
        line_size: u64,
        associativity: u64,
    },

    #[error("invalid cache configuration: address_bits must be in 1..=64, got {0}")]
    AddressBits(u32),

    #[error("invalid cache configuration: line_size {line_size} does not fit in {address_bits} address bits")]
    LineTooWide { line_size: u64, address_bits: u32 },

    #[error("couldn't read the config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't parse the config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures while reading a trace
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace line {line}: {reason}")]
    Format { line: u64, reason: String },

    /// `advance` was called after `done` reported true. Never expected from a correct driver
    #[error("trace exhausted: advance called past the end of the trace")]
    Exhausted,

    #[error("peek({requested}) is outside the look-ahead window of {window} accesses")]
    LookAheadExceeded { requested: usize, window: usize },

    #[error("no look-ahead is available to score future references")]
    LookAheadUnavailable,

    #[error("couldn't open the trace file at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while reading the trace: {0}")]
    Io(#[from] io::Error),
}

/// Failures raised by `Cache::read`. None of them leave the cache partially updated
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid address {:#x} (pc {:#x}): {reason}", .access.address, .access.pc)]
    InvalidAddress { access: Access, reason: String },

    /// The scorer was handed an access that is not the one the trace last produced
    #[error("scorer out of sync with the trace: reading {reading:#x}, trace is at {trace:?}")]
    OutOfSync { reading: u64, trace: Option<u64> },

    #[error("eviction policy chose way {way}, the set only has {associativity} ways")]
    VictimOutOfRange { way: usize, associativity: usize },

    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Statistics that cannot be derived from what was observed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("hit rate is undefined: no accesses were observed (division by zero)")]
    NoAccesses,

    #[error("instruction_count must be non-zero to compute MPKI")]
    ZeroInstructionCount,
}

/// Everything a simulation run can fail with
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Stats(#[from] StatsError),
}
