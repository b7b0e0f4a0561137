use serde::Serialize;

use crate::cache::{CacheAccess, EvictionDecision};
use crate::error::StatsError;

/// Receives every resolved access, in trace order, before `Cache::read` returns
pub trait CacheObserver {
    fn observe(&mut self, access: &CacheAccess, decision: &EvictionDecision);
}

impl<F: FnMut(&CacheAccess, &EvictionDecision)> CacheObserver for F {
    fn observe(&mut self, access: &CacheAccess, decision: &EvictionDecision) {
        self(access, decision)
    }
}

/// Accumulates hit rate and MPKI without keeping any per-access history.
///
/// MPKI is normalised by an instruction count which does not come from the trace (the trace only
/// holds memory accesses), so it has to be supplied by whoever recorded the trace
#[derive(Debug, Clone, Serialize)]
pub struct HitRateObserver {
    accesses: u64,
    misses: u64,
    evictions: u64,
    instruction_count: u64,
}

impl HitRateObserver {
    pub fn new(instruction_count: u64) -> Result<Self, StatsError> {
        if instruction_count == 0 {
            return Err(StatsError::ZeroInstructionCount);
        }
        Ok(Self {
            accesses: 0,
            misses: 0,
            evictions: 0,
            instruction_count,
        })
    }

    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn hits(&self) -> u64 {
        self.accesses - self.misses
    }

    /// Misses which displaced a resident line
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Misses per thousand instructions
    pub fn mpki(&self) -> f64 {
        self.misses as f64 / self.instruction_count as f64 * 1000.0
    }

    /// Fails rather than inventing a value when nothing was observed
    pub fn hit_rate(&self) -> Result<f64, StatsError> {
        if self.accesses == 0 {
            return Err(StatsError::NoAccesses);
        }
        Ok(1.0 - self.misses as f64 / self.accesses as f64)
    }
}

impl CacheObserver for HitRateObserver {
    fn observe(&mut self, _access: &CacheAccess, decision: &EvictionDecision) {
        self.accesses += 1;
        if decision.is_miss() {
            self.misses += 1;
        }
        if decision.victim.is_some() {
            self.evictions += 1;
        }
    }
}
