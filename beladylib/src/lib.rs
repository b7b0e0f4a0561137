//! # BeladyLib
//!
//! BeladyLib replays recorded memory-access traces through a single set-associative cache, and
//! reports how it performs under a chosen eviction policy.
//!
//! Its main use is Belady's clairvoyant policy: with the whole trace in view it evicts whichever
//! line is next referenced furthest in the future, which gives the best hit rate any policy can
//! reach on that trace and geometry. Online or learned policies are measured against that bound
//!
//! The cache is generic over its eviction policy, and reports every access to a list of observers
//! so statistics stream over traces of any length

/// Contains the set-associative cache and the types describing each access and its outcome
pub mod cache;

/// Contains definitions for the JSON configuration format
pub mod config;

/// Error types for configuration, trace reading, cache reads and statistics
pub mod error;

/// Contains the offline next-reference index and an in-memory trace built on it
pub mod future;

/// Opens trace files for reading
pub mod io;

/// Contains the observer trait and the hit rate / MPKI observer
pub mod observer;

/// Contains the provided eviction policies, with traits for implementing custom policies and
/// scorers
pub mod replacement_policies;

/// Contains the simulator used to replay a trace through a configured cache
pub mod simulator;

/// Trace records, the streaming reader, and the look-ahead traits scorers rely on
pub mod trace;

/// Utilities for finding traces on disk
pub mod util;

// Generated from the build.rs, private
mod hex {
    include!(concat!(env!("OUT_DIR"), "/hex.rs"));
}
#[cfg(test)]
mod test;

pub use error::Error;
