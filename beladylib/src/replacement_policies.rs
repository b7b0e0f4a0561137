use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::cache::{CacheAccess, CacheLine};
use crate::config::PolicyConfig;
use crate::error::CacheError;
use crate::trace::{FutureReferences, Score};

/// The way an eviction policy picked, and the scores it ranked the set by, if it scored at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VictimChoice {
    pub way: usize,
    pub scores: Vec<Score>,
}

/// A generic trait for implementing eviction policies. Used to parameterise a Cache.
///
/// The cache resolves hits and fills of free slots itself, a policy is asked to decide only when
/// a miss lands in a full set
pub trait EvictionPolicy {
    /// Updates the policy when a resident line is read
    ///
    /// Not applicable for some policies, a default which does nothing is provided
    fn on_hit(&mut self, _access: &CacheAccess, _way: usize) {}

    /// Updates the policy when `way` has been filled with the line `access` refers to
    fn on_fill(&mut self, _access: &CacheAccess, _way: usize) {}

    /// Chooses which way of a full set to evict to make room for `access`
    ///
    /// # Arguments
    ///
    /// * `access`: The access which missed
    /// * `lines`: Every line of the target set, all valid, in way order
    /// * `future`: Look-ahead into the trace, for clairvoyant policies
    ///
    /// returns: Result<VictimChoice, CacheError>
    fn choose_victim<F: FutureReferences + ?Sized>(
        &mut self,
        access: &CacheAccess,
        lines: &[CacheLine],
        future: &F,
    ) -> Result<VictimChoice, CacheError>;
}

/// Ranks a resident line for eviction. Higher scores are evicted first
pub trait LineScorer {
    fn score<F: FutureReferences + ?Sized>(
        &self,
        access: &CacheAccess,
        line: &CacheLine,
        future: &F,
    ) -> Result<Score, CacheError>;
}

/// Evicts the line with the highest score under any scorer.
///
/// Ties go to the lowest way, so among several lines that are never reused the first one in the
/// set is evicted. This keeps runs deterministic and independent of hashing order
pub struct GreedyEvictionPolicy<S: LineScorer> {
    scorer: S,
}

impl<S: LineScorer> GreedyEvictionPolicy<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }
}

impl<S: LineScorer> EvictionPolicy for GreedyEvictionPolicy<S> {
    fn choose_victim<F: FutureReferences + ?Sized>(
        &mut self,
        access: &CacheAccess,
        lines: &[CacheLine],
        future: &F,
    ) -> Result<VictimChoice, CacheError> {
        let scores = lines
            .iter()
            .map(|line| self.scorer.score(access, line, future))
            .collect::<Result<Vec<_>, _>>()?;
        // Strictly greater only, earlier ways win ties
        let mut way = 0;
        for (index, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[way] {
                way = index;
            }
        }
        Ok(VictimChoice { way, scores })
    }
}

/// Belady's clairvoyant scorer: a line scores the distance to the next reference of its address,
/// `Infinite` when it is never referenced again within the look-ahead window.
///
/// The scoring context must be the trace the access being resolved was just read from, anything
/// else would silently corrupt every later decision, so a mismatch is an error
#[derive(Debug, Default, Clone, Copy)]
pub struct BeladyScorer;

impl LineScorer for BeladyScorer {
    fn score<F: FutureReferences + ?Sized>(
        &self,
        access: &CacheAccess,
        line: &CacheLine,
        future: &F,
    ) -> Result<Score, CacheError> {
        let current = future.current().map(|a| a.address);
        if current != Some(access.line_address) {
            return Err(CacheError::OutOfSync {
                reading: access.line_address,
                trace: current,
            });
        }
        Ok(future.next_use(line.line_address)?)
    }
}

/// Scores a line by the time since it was last accessed, so greedy eviction becomes LRU
#[derive(Debug, Default, Clone, Copy)]
pub struct LruScorer;

impl LineScorer for LruScorer {
    fn score<F: FutureReferences + ?Sized>(
        &self,
        access: &CacheAccess,
        line: &CacheLine,
        _future: &F,
    ) -> Result<Score, CacheError> {
        Ok(Score::Finite(access.time - line.last_access))
    }
}

/// Evicts a uniformly random way. Seeded, so runs are reproducible
pub struct RandomPolicy {
    rng: SmallRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl EvictionPolicy for RandomPolicy {
    fn choose_victim<F: FutureReferences + ?Sized>(
        &mut self,
        _access: &CacheAccess,
        lines: &[CacheLine],
        _future: &F,
    ) -> Result<VictimChoice, CacheError> {
        Ok(VictimChoice {
            way: self.rng.gen_range(0..lines.len()),
            scores: Vec::new(),
        })
    }
}

pub type BeladyPolicy = GreedyEvictionPolicy<BeladyScorer>;
pub type LruPolicy = GreedyEvictionPolicy<LruScorer>;

/// Enum for every policy provided by the library, so one can be picked from a configuration.
///
/// Trait objects would be less boilerplate, but `choose_victim` is generic over the scoring
/// context, and explicit branching lets the compiler see the concrete types and inline through
/// them on every miss
pub enum AnyPolicy {
    Belady(BeladyPolicy),
    LeastRecentlyUsed(LruPolicy),
    Random(RandomPolicy),
}

impl AnyPolicy {
    pub fn from_config(config: PolicyConfig, seed: u64) -> Self {
        match config {
            PolicyConfig::Belady => Self::from(GreedyEvictionPolicy::new(BeladyScorer)),
            PolicyConfig::LeastRecentlyUsed => Self::from(GreedyEvictionPolicy::new(LruScorer)),
            PolicyConfig::Random => Self::from(RandomPolicy::new(seed)),
        }
    }

    /// Whether the policy consults the future, and so needs a trace as its scoring context
    pub fn needs_look_ahead(&self) -> bool {
        matches!(self, AnyPolicy::Belady(_))
    }
}

impl From<BeladyPolicy> for AnyPolicy {
    fn from(value: BeladyPolicy) -> Self {
        Self::Belady(value)
    }
}

impl From<LruPolicy> for AnyPolicy {
    fn from(value: LruPolicy) -> Self {
        Self::LeastRecentlyUsed(value)
    }
}

impl From<RandomPolicy> for AnyPolicy {
    fn from(value: RandomPolicy) -> Self {
        Self::Random(value)
    }
}

impl EvictionPolicy for AnyPolicy {
    fn on_hit(&mut self, access: &CacheAccess, way: usize) {
        match self {
            AnyPolicy::Belady(p) => p.on_hit(access, way),
            AnyPolicy::LeastRecentlyUsed(p) => p.on_hit(access, way),
            AnyPolicy::Random(p) => p.on_hit(access, way),
        }
    }

    fn on_fill(&mut self, access: &CacheAccess, way: usize) {
        match self {
            AnyPolicy::Belady(p) => p.on_fill(access, way),
            AnyPolicy::LeastRecentlyUsed(p) => p.on_fill(access, way),
            AnyPolicy::Random(p) => p.on_fill(access, way),
        }
    }

    fn choose_victim<F: FutureReferences + ?Sized>(
        &mut self,
        access: &CacheAccess,
        lines: &[CacheLine],
        future: &F,
    ) -> Result<VictimChoice, CacheError> {
        match self {
            AnyPolicy::Belady(p) => p.choose_victim(access, lines, future),
            AnyPolicy::LeastRecentlyUsed(p) => p.choose_victim(access, lines, future),
            AnyPolicy::Random(p) => p.choose_victim(access, lines, future),
        }
    }
}
