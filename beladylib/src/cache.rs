use serde::Serialize;

use crate::config::CacheConfig;
use crate::error::{CacheError, ConfigError};
use crate::observer::CacheObserver;
use crate::replacement_policies::EvictionPolicy;
use crate::trace::{Access, FutureReferences, Score};

/// One slot of a set. A line is either invalid, or valid and holding `tag`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheLine {
    pub valid: bool,
    pub tag: u64,
    /// The line-aligned address resident in this slot. This is the key scorers look up
    pub line_address: u64,
    /// The program counter of the most recent access to this line
    pub pc: u64,
    /// Cache time at which the line was filled
    pub inserted_at: u64,
    /// Cache time of the most recent access to this line
    pub last_access: u64,
}

/// The cache's view of one access, after address decomposition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheAccess {
    pub pc: u64,
    pub address: u64,
    pub line_address: u64,
    pub set_index: u64,
    pub tag: u64,
    /// Number of reads resolved before this one
    pub time: u64,
}

/// Identifies a line displaced by an eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineId {
    pub set: u64,
    pub way: usize,
    pub tag: u64,
    pub line_address: u64,
}

/// The outcome of a single read.
///
/// `evict` doubles as the miss flag: it is true for every miss, including a miss which filled a
/// free slot and displaced nothing (`victim` is `None` then)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionDecision {
    pub evict: bool,
    pub victim: Option<LineId>,
    /// Per-way scores, when the policy scored the set to choose the victim
    pub candidate_scores: Vec<Score>,
}

impl EvictionDecision {
    pub fn hit() -> Self {
        Self {
            evict: false,
            victim: None,
            candidate_scores: Vec::new(),
        }
    }

    pub fn fill() -> Self {
        Self {
            evict: true,
            victim: None,
            candidate_scores: Vec::new(),
        }
    }

    pub fn is_miss(&self) -> bool {
        self.evict
    }
}

/// A set-associative cache, parameterised by an eviction policy.
///
/// As with the rest of the library we rely on monomorphisation so the policy calls can be inlined,
/// and the enum in `replacement_policies` covers selecting a policy at runtime.
///
/// Lines are stored flat, set `s` occupies `lines[s * associativity..(s + 1) * associativity]`.
/// The policy is only consulted when a miss lands in a full set
pub struct Cache<P: EvictionPolicy> {
    line_size: u64,
    capacity: u64,
    associativity: usize,
    num_sets: u64,
    address_bits: u32,
    lines: Vec<CacheLine>,
    policy: P,
    time: u64,
}

impl<P: EvictionPolicy> Cache<P> {
    /// Builds an empty cache, rejecting any geometry where
    /// `capacity != num_sets * associativity * line_size`
    pub fn new(config: &CacheConfig, policy: P) -> Result<Self, ConfigError> {
        let num_sets = config.num_sets()?;
        let associativity = config.associativity as usize;
        Ok(Self {
            line_size: config.line_size,
            capacity: config.capacity,
            associativity,
            num_sets,
            address_bits: config.address_bits,
            lines: vec![CacheLine::default(); num_sets as usize * associativity],
            policy,
            time: 0,
        })
    }

    /// Splits an address into line address, set index and tag
    pub fn decompose(&self, pc: u64, address: u64) -> Result<CacheAccess, CacheError> {
        if self.address_bits < u64::BITS && address >> self.address_bits != 0 {
            return Err(CacheError::InvalidAddress {
                access: Access { pc, address },
                reason: format!("wider than {} address bits", self.address_bits),
            });
        }
        let line_number = address / self.line_size;
        Ok(CacheAccess {
            pc,
            address,
            line_address: line_number * self.line_size,
            set_index: line_number % self.num_sets,
            tag: line_number / self.num_sets,
            time: self.time,
        })
    }

    /// Resolves one access, notifying every observer in order before returning.
    ///
    /// `future` is the scoring context for policies which look ahead, usually the trace the access
    /// was read from. Every failure is raised before the cache is modified, so an error leaves the
    /// cache as it was and notifies no observer
    pub fn read<F: FutureReferences + ?Sized>(
        &mut self,
        pc: u64,
        address: u64,
        future: &F,
        observers: &mut [&mut dyn CacheObserver],
    ) -> Result<EvictionDecision, CacheError> {
        let access = self.decompose(pc, address)?;
        let base = access.set_index as usize * self.associativity;
        let set = base..base + self.associativity;

        let hit_way = self.lines[set.clone()]
            .iter()
            .position(|line| line.valid && line.tag == access.tag);
        let decision = if let Some(way) = hit_way {
            let line = &mut self.lines[base + way];
            line.last_access = access.time;
            line.pc = access.pc;
            self.policy.on_hit(&access, way);
            EvictionDecision::hit()
        } else if let Some(way) = self.lines[set.clone()].iter().position(|line| !line.valid) {
            self.install(&access, way);
            EvictionDecision::fill()
        } else {
            let choice = self.policy.choose_victim(&access, &self.lines[set], future)?;
            if choice.way >= self.associativity {
                return Err(CacheError::VictimOutOfRange {
                    way: choice.way,
                    associativity: self.associativity,
                });
            }
            let evicted = self.lines[base + choice.way];
            let victim = LineId {
                set: access.set_index,
                way: choice.way,
                tag: evicted.tag,
                line_address: evicted.line_address,
            };
            tracing::trace!(
                time = access.time,
                set = access.set_index,
                way = choice.way,
                victim = evicted.line_address,
                incoming = access.line_address,
                "evicting line"
            );
            self.install(&access, choice.way);
            EvictionDecision {
                evict: true,
                victim: Some(victim),
                candidate_scores: choice.scores,
            }
        };

        self.time += 1;
        for observer in observers.iter_mut() {
            observer.observe(&access, &decision);
        }
        Ok(decision)
    }

    fn install(&mut self, access: &CacheAccess, way: usize) {
        self.lines[access.set_index as usize * self.associativity + way] = CacheLine {
            valid: true,
            tag: access.tag,
            line_address: access.line_address,
            pc: access.pc,
            inserted_at: access.time,
            last_access: access.time,
        };
        self.policy.on_fill(access, way);
    }

    /// Invalidates every line
    pub fn flush(&mut self) {
        for line in &mut self.lines {
            line.valid = false;
        }
    }

    /// The lines of one set, in way order
    pub fn set(&self, set_index: u64) -> &[CacheLine] {
        let base = set_index as usize * self.associativity;
        &self.lines[base..base + self.associativity]
    }

    /// Whether the line holding `address` is resident
    pub fn contains(&self, address: u64) -> bool {
        let line_number = address / self.line_size;
        let tag = line_number / self.num_sets;
        self.set(line_number % self.num_sets)
            .iter()
            .any(|line| line.valid && line.tag == tag)
    }

    /// Gets the number of unoccupied lines. Useful for analysing cache performance or debugging
    pub fn invalid_line_count(&self) -> usize {
        self.lines.iter().filter(|line| !line.valid).count()
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn associativity(&self) -> usize {
        self.associativity
    }

    pub fn num_sets(&self) -> u64 {
        self.num_sets
    }

    /// Number of reads resolved so far
    pub fn time(&self) -> u64 {
        self.time
    }
}
