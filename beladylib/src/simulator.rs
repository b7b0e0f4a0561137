use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::config::{PolicyConfig, SimulationConfig};
use crate::error::Error;
use crate::io::open_trace;
use crate::observer::{CacheObserver, HitRateObserver};
use crate::replacement_policies::AnyPolicy;
use crate::trace::AccessTrace;

/// How often, in accesses, progress is logged
const PROGRESS_INTERVAL: u64 = 1 << 20;

/// The simulator replays traces through a cache and collects results.
///
/// It supports calling simulate multiple times, continuing with the same cache contents, and will
/// update the time taken to simulate and the results accordingly
pub struct Simulator {
    cache: Cache<AnyPolicy>,
    stats: HitRateObserver,
    policy: PolicyConfig,
    simulation_time: Duration,
}

/// The result of a simulation run. Can be serialised as the JSON report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    pub policy: PolicyConfig,
    pub accesses: u64,
    pub misses: u64,
    pub evictions: u64,
    pub mpki: f64,
    pub hit_rate: f64,
}

impl Simulator {
    /// Creates a new simulator for a given configuration
    ///
    /// # Arguments
    ///
    /// * `config`: A simulation configuration, usually resulting from parsing JSON
    ///
    /// returns: Result<Simulator, Error>
    pub fn new(config: &SimulationConfig) -> Result<Self, Error> {
        let policy = AnyPolicy::from_config(config.policy, config.seed);
        Ok(Self {
            cache: Cache::new(&config.cache, policy)?,
            stats: HitRateObserver::new(config.instruction_count)?,
            policy: config.policy,
            simulation_time: Duration::new(0, 0),
        })
    }

    /// Replays every remaining access of `trace`, in order.
    ///
    /// The trace doubles as the scoring context, so it must be the source of the accesses for
    /// Belady's policy to see the right future. `observers` receive every access after the
    /// simulator's own statistics
    ///
    /// # Arguments
    ///
    /// * `trace`: The trace to replay
    /// * `observers`: Additional observers, called in order
    ///
    /// returns: Result<SimulationResult, Error>. Fails on the first bad record or address, and
    /// when the trace held no accesses at all, as the hit rate is undefined
    pub fn simulate<T: AccessTrace + ?Sized>(
        &mut self,
        trace: &mut T,
        observers: &mut [&mut dyn CacheObserver],
    ) -> Result<SimulationResult, Error> {
        let start = Instant::now();
        let mut chain: Vec<&mut dyn CacheObserver> = Vec::with_capacity(observers.len() + 1);
        chain.push(&mut self.stats);
        chain.extend(observers.iter_mut().map(|o| &mut **o as &mut dyn CacheObserver));

        while !trace.done() {
            let access = trace.advance()?;
            self.cache.read(access.pc, access.address, &*trace, &mut chain)?;
            let time = self.cache.time();
            if time % PROGRESS_INTERVAL == 0 {
                tracing::debug!(accesses = time, "simulation progress");
            }
        }
        drop(chain);

        self.simulation_time += start.elapsed();
        self.result()
    }

    /// The statistics accumulated so far
    pub fn result(&self) -> Result<SimulationResult, Error> {
        Ok(SimulationResult {
            trace: None,
            policy: self.policy,
            accesses: self.stats.accesses(),
            misses: self.stats.misses(),
            evictions: self.stats.evictions(),
            mpki: self.stats.mpki(),
            hit_rate: self.stats.hit_rate()?,
        })
    }

    /// Gets the wall-clock execution time for processing
    pub fn get_execution_time(&self) -> &Duration {
        &self.simulation_time
    }

    /// Gets the number of lines which were never filled, or were flushed
    pub fn get_uninitialised_line_count(&self) -> usize {
        self.cache.invalid_line_count()
    }

    pub fn cache(&self) -> &Cache<AnyPolicy> {
        &self.cache
    }

    pub fn stats(&self) -> &HitRateObserver {
        &self.stats
    }
}

/// Replays a trace file under a configuration and reports MPKI and hit rate
pub fn evaluate_trace(path: &Path, config: &SimulationConfig) -> Result<SimulationResult, Error> {
    let mut trace = open_trace(path, config.trace_options()?)?;
    let mut simulator = Simulator::new(config)?;
    tracing::info!(
        trace = %path.display(),
        policy = ?config.policy,
        line_size = config.cache.line_size,
        capacity = config.cache.capacity,
        associativity = config.cache.associativity,
        num_sets = simulator.cache().num_sets(),
        "simulating trace"
    );
    let mut result = simulator.simulate(&mut trace, &mut [])?;
    result.trace = Some(path.display().to_string());
    tracing::info!(
        trace = %path.display(),
        accesses = result.accesses,
        misses = result.misses,
        mpki = result.mpki,
        hit_rate = result.hit_rate,
        seconds = simulator.get_execution_time().as_secs_f64(),
        "simulation finished"
    );
    Ok(result)
}
