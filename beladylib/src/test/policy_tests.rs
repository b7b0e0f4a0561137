use std::collections::HashMap;

use rstest::rstest;

use crate::cache::{Cache, CacheAccess, CacheLine};
use crate::config::{CacheConfig, PolicyConfig};
use crate::error::TraceError;
use crate::replacement_policies::{
    AnyPolicy, BeladyScorer, EvictionPolicy, GreedyEvictionPolicy, LineScorer, LruScorer, RandomPolicy,
};
use crate::test::{hits, replay, trace_of};
use crate::trace::{Access, FutureReferences, NoLookAhead, Score};

/// A scoring context with fixed answers
struct FixedFuture {
    current: u64,
    next_uses: HashMap<u64, Score>,
}

impl FixedFuture {
    fn new(current: u64, next_uses: &[(u64, Score)]) -> Self {
        Self {
            current,
            next_uses: next_uses.iter().copied().collect(),
        }
    }
}

impl FutureReferences for FixedFuture {
    fn next_use(&self, line_address: u64) -> Result<Score, TraceError> {
        Ok(self.next_uses.get(&line_address).copied().unwrap_or(Score::Infinite))
    }

    fn current(&self) -> Option<Access> {
        Some(Access {
            pc: 0,
            address: self.current,
        })
    }
}

fn access_to(line_address: u64, time: u64) -> CacheAccess {
    CacheAccess {
        pc: 0,
        address: line_address,
        line_address,
        set_index: 0,
        tag: line_address,
        time,
    }
}

fn resident(line_addresses: &[u64]) -> Vec<CacheLine> {
    line_addresses
        .iter()
        .enumerate()
        .map(|(way, &line_address)| CacheLine {
            valid: true,
            tag: line_address,
            line_address,
            pc: 0,
            inserted_at: way as u64,
            last_access: way as u64,
        })
        .collect()
}

#[test]
fn infinite_dominates_every_finite_score() {
    assert!(Score::Infinite > Score::Finite(u64::MAX));
    assert!(Score::Finite(2) > Score::Finite(1));
    assert!(Score::Infinite.is_infinite());
    assert!(!Score::Finite(0).is_infinite());
}

#[rstest]
#[case(&[(10, Score::Finite(3)), (11, Score::Finite(9)), (12, Score::Finite(1))], 1)]
#[case(&[(10, Score::Finite(3)), (11, Score::Finite(9)), (12, Score::Infinite)], 2)]
#[case(&[(10, Score::Finite(100)), (11, Score::Finite(100)), (12, Score::Finite(1))], 0)]
#[case(&[(10, Score::Finite(1)), (11, Score::Infinite), (12, Score::Infinite)], 1)]
#[case(&[(10, Score::Infinite), (11, Score::Infinite), (12, Score::Infinite)], 0)]
fn belady_evicts_furthest_next_use(#[case] next_uses: &[(u64, Score)], #[case] expected_way: usize) {
    let future = FixedFuture::new(99, next_uses);
    let mut policy = GreedyEvictionPolicy::new(BeladyScorer);
    let choice = policy
        .choose_victim(&access_to(99, 5), &resident(&[10, 11, 12]), &future)
        .unwrap();
    assert_eq!(choice.way, expected_way);
    assert_eq!(
        choice.scores,
        next_uses.iter().map(|(_, score)| *score).collect::<Vec<_>>()
    );
}

#[test]
fn never_reused_line_is_evicted_over_distant_reuse() {
    // Line 10 comes back at the very end of a long trace, line 11 never does
    let future = FixedFuture::new(99, &[(10, Score::Finite(u64::MAX - 1))]);
    let mut policy = GreedyEvictionPolicy::new(BeladyScorer);
    let choice = policy
        .choose_victim(&access_to(99, 5), &resident(&[10, 11]), &future)
        .unwrap();
    assert_eq!(choice.way, 1);
}

#[test]
fn belady_scorer_propagates_missing_look_ahead() {
    let line = resident(&[10])[0];
    // In sync, but the context can't see the future
    struct Blind;
    impl FutureReferences for Blind {
        fn next_use(&self, _line_address: u64) -> Result<Score, TraceError> {
            Err(TraceError::LookAheadUnavailable)
        }
        fn current(&self) -> Option<Access> {
            Some(Access { pc: 0, address: 99 })
        }
    }
    assert!(BeladyScorer.score(&access_to(99, 0), &line, &Blind).is_err());
}

#[test]
fn lru_scores_by_age() {
    let lines = resident(&[10, 11, 12]);
    let access = access_to(99, 10);
    let scores: Vec<Score> = lines
        .iter()
        .map(|line| LruScorer.score(&access, line, &NoLookAhead).unwrap())
        .collect();
    assert_eq!(scores, vec![Score::Finite(10), Score::Finite(9), Score::Finite(8)]);

    let mut policy = GreedyEvictionPolicy::new(LruScorer);
    assert_eq!(policy.choose_victim(&access, &lines, &NoLookAhead).unwrap().way, 0);
}

#[test]
fn random_policy_is_seeded_and_in_range() {
    let lines = resident(&[1, 2, 3, 4, 5, 6, 7, 8]);
    let mut a = RandomPolicy::new(42);
    let mut b = RandomPolicy::new(42);
    for time in 0..256 {
        let access = access_to(99, time);
        let way_a = a.choose_victim(&access, &lines, &NoLookAhead).unwrap().way;
        let way_b = b.choose_victim(&access, &lines, &NoLookAhead).unwrap().way;
        assert!(way_a < lines.len());
        assert_eq!(way_a, way_b);
    }
}

#[test]
fn known_optimal_hit_counts() {
    // One set of two ways. In `a b c a b c`, Belady keeps a and drops b for c, then keeps c
    let mut cache = Cache::new(&CacheConfig::new(1, 2, 2), GreedyEvictionPolicy::new(BeladyScorer)).unwrap();
    let decisions = replay(&mut cache, &mut trace_of(&[1, 2, 3, 1, 2, 3])).unwrap();
    assert_eq!(hits(&decisions), 2);
    assert_eq!(decisions[2].victim.map(|v| v.line_address), Some(2));
    assert_eq!(decisions[4].victim.map(|v| v.line_address), Some(1));

    // A cyclic scan over one line more than fits defeats LRU completely
    let scan: Vec<u64> = (0..10).flat_map(|_| 0..4).collect();
    let mut lru = Cache::new(&CacheConfig::new(1, 3, 3), GreedyEvictionPolicy::new(LruScorer)).unwrap();
    assert_eq!(hits(&replay(&mut lru, &mut trace_of(&scan)).unwrap()), 0);
    let mut opt = Cache::new(&CacheConfig::new(1, 3, 3), GreedyEvictionPolicy::new(BeladyScorer)).unwrap();
    // After the 4 compulsory misses, OPT misses once every 3 accesses: 36 accesses left, 12 misses
    assert_eq!(hits(&replay(&mut opt, &mut trace_of(&scan)).unwrap()), 24);
}

#[rstest]
#[case(PolicyConfig::Belady, true)]
#[case(PolicyConfig::LeastRecentlyUsed, false)]
#[case(PolicyConfig::Random, false)]
fn policy_from_config(#[case] config: PolicyConfig, #[case] needs_look_ahead: bool) {
    let policy = AnyPolicy::from_config(config, 7);
    assert_eq!(policy.needs_look_ahead(), needs_look_ahead);
    let matches_config = matches!(
        (&policy, config),
        (AnyPolicy::Belady(_), PolicyConfig::Belady)
            | (AnyPolicy::LeastRecentlyUsed(_), PolicyConfig::LeastRecentlyUsed)
            | (AnyPolicy::Random(_), PolicyConfig::Random)
    );
    assert!(matches_config);
}

#[test]
fn any_policy_dispatches_to_the_configured_policy() {
    let trace: Vec<u64> = vec![1, 2, 3, 1, 2, 3, 4, 1, 2];
    let mut direct = Cache::new(&CacheConfig::new(1, 2, 2), GreedyEvictionPolicy::new(BeladyScorer)).unwrap();
    let mut dispatched = Cache::new(&CacheConfig::new(1, 2, 2), AnyPolicy::from_config(PolicyConfig::Belady, 0)).unwrap();
    assert_eq!(
        replay(&mut direct, &mut trace_of(&trace)).unwrap(),
        replay(&mut dispatched, &mut trace_of(&trace)).unwrap()
    );
}
