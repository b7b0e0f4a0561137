use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use beladylib::config::{CacheConfig, PolicyConfig, SimulationConfig};
use beladylib::io::open_trace;
use beladylib::simulator::{SimulationResult, Simulator};
use beladylib::trace::Radix;
use beladylib::util::{discover_traces, TracePath, DEFAULT_TRACE_PATTERN};
use clap::Parser;
use regex::Regex;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[cfg(debug_assertions)]
const DEBUG_DEFAULT: bool = true;

#[cfg(not(debug_assertions))]
const DEBUG_DEFAULT: bool = false;

// Geometry used when neither a config file nor flags give one: a 2 MiB, 16-way LLC with 64 byte
// lines
const DEFAULT_LINE_SIZE: u64 = 64;
const DEFAULT_CAPACITY: u64 = 1 << 21;
const DEFAULT_ASSOCIATIVITY: u64 = 16;

/// Batch output, successful results alongside the traces which failed
#[derive(Serialize)]
struct BatchReport<'a> {
    results: &'a [SimulationResult],
    failed: &'a [String],
}

#[derive(Parser, Debug)]
#[command(about = String::from("Belady's optimal replacement simulator for memory access traces"))]
struct Args {
    /// Trace of `program_counter, address` records
    #[arg(long, required_unless_present = "trace_dir", conflicts_with = "trace_dir")]
    trace_file: Option<PathBuf>,

    /// Directory of traces, each simulated on its own
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Regex selecting traces in --trace-dir. A `name` group names each result
    #[arg(long, requires = "trace_dir")]
    pattern: Option<String>,

    /// Report destination, stdout when absent
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// JSON simulation config. Flags given alongside it take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    line_size: Option<u64>,

    #[arg(long)]
    capacity: Option<u64>,

    #[arg(long)]
    associativity: Option<u64>,

    /// Instructions executed while the trace was recorded, normalises MPKI
    #[arg(long)]
    instruction_count: Option<u64>,

    #[arg(long, value_enum)]
    policy: Option<PolicyConfig>,

    /// Seed for the random policy
    #[arg(long)]
    seed: Option<u64>,

    /// Accesses visible to Belady's scorer, the whole trace when absent
    #[arg(long)]
    max_look_ahead: Option<usize>,

    #[arg(long, value_enum)]
    radix: Option<Radix>,

    /// Skip the first line of each trace
    #[arg(long)]
    skip_header: bool,

    /// Write the report as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    performance: bool,

    #[arg(short, long, default_value_t = DEBUG_DEFAULT)]
    debug: bool,
}

fn main() -> Result<(), String> {
    let start = Instant::now();
    let args = Args::parse();
    init_logging(args.debug);
    let config = build_config(&args)?;
    tracing::debug!(?config, "parsed configuration");

    let traces = match (&args.trace_file, &args.trace_dir) {
        (Some(path), _) => vec![TracePath {
            name: path.display().to_string(),
            path: path.clone(),
        }],
        (None, Some(dir)) => {
            let pattern = match &args.pattern {
                Some(p) => Regex::new(p).map_err(|e| format!("Couldn't parse the trace pattern: {e}"))?,
                None => DEFAULT_TRACE_PATTERN.clone(),
            };
            discover_traces(dir, &pattern)
                .map_err(|e| format!("Couldn't list the trace directory at path {}: {e}", dir.display()))?
        }
        (None, None) => unreachable!("clap requires a trace file or directory"),
    };
    if traces.is_empty() {
        return Err("No trace files found".to_string());
    }

    #[cfg(debug_assertions)]
    if args.debug {
        eprintln!("Running the debug binary, debug mode is enabled by default. If benchmarking, do not use this binary, re-compile with the --release argument when using cargo run");
    }

    let mut results = Vec::with_capacity(traces.len());
    let mut failed = Vec::new();
    for trace in &traces {
        match simulate(trace, &config, &args) {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(trace = %trace.path.display(), "{e}");
                failed.push(trace.name.clone());
            }
        }
    }
    // A lone trace has nothing to report if it failed
    if args.trace_file.is_some() && !failed.is_empty() {
        return Err(format!("Simulation of {} failed", failed[0]));
    }

    let report = if args.json {
        let json = match &args.trace_file {
            Some(_) => serde_json::to_string_pretty(&results[0]),
            None => serde_json::to_string_pretty(&BatchReport {
                results: &results,
                failed: &failed,
            }),
        };
        json.map_err(|e| format!("Couldn't serialise the output {e}"))? + "\n"
    } else {
        text_report(&results, args.trace_dir.is_some())
    };
    match &args.output_file {
        Some(path) => fs::write(path, report)
            .map_err(|e| format!("Couldn't write the report to {}: {e}", path.display()))?,
        None => print!("{report}"),
    }

    if args.performance {
        let total_time = start.elapsed();
        eprintln!("Total execution time (includes parsing, configuration, and output): {}s", total_time.as_secs_f64());
    }
    if !failed.is_empty() {
        return Err(format!("{} of {} traces failed", failed.len(), traces.len()));
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Merges the config file, if any, with the command line. Flags win
fn build_config(args: &Args) -> Result<SimulationConfig, String> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_path(path).map_err(|e| e.to_string())?,
        None => SimulationConfig {
            cache: CacheConfig::new(DEFAULT_LINE_SIZE, DEFAULT_CAPACITY, DEFAULT_ASSOCIATIVITY),
            policy: PolicyConfig::default(),
            seed: 0,
            instruction_count: args
                .instruction_count
                .ok_or("--instruction-count is required when no --config is given")?,
            max_look_ahead: None,
            radix: Radix::default(),
            skip_header: false,
        },
    };
    if let Some(line_size) = args.line_size {
        config.cache.line_size = line_size;
    }
    if let Some(capacity) = args.capacity {
        config.cache.capacity = capacity;
    }
    if let Some(associativity) = args.associativity {
        config.cache.associativity = associativity;
    }
    if let Some(instruction_count) = args.instruction_count {
        config.instruction_count = instruction_count;
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.max_look_ahead.is_some() {
        config.max_look_ahead = args.max_look_ahead;
    }
    if let Some(radix) = args.radix {
        config.radix = radix;
    }
    config.skip_header |= args.skip_header;
    Ok(config)
}

fn simulate(trace: &TracePath, config: &SimulationConfig, args: &Args) -> Result<SimulationResult, String> {
    let options = config.trace_options().map_err(|e| e.to_string())?;
    let mut simulator = Simulator::new(config).map_err(|e| e.to_string())?;
    let mut reader = open_trace(&trace.path, options).map_err(|e| e.to_string())?;
    tracing::info!(
        trace = %trace.path.display(),
        policy = ?config.policy,
        num_sets = simulator.cache().num_sets(),
        associativity = config.cache.associativity,
        "simulating trace"
    );
    let mut result = simulator
        .simulate(&mut reader, &mut [])
        .map_err(|e| format!("{}: {e}", trace.path.display()))?;
    result.trace = Some(trace.name.clone());
    tracing::info!(trace = %trace.name, mpki = result.mpki, hit_rate = result.hit_rate, "simulation finished");

    if args.performance {
        eprintln!("Simulation time for {}: {}s", trace.name, simulator.get_execution_time().as_secs_f64());
    }
    if args.debug {
        eprintln!("Uninitialised cache lines for {}: {}", trace.name, simulator.get_uninitialised_line_count());
    }
    Ok(result)
}

/// The plain text report, `MPKI <x>` and `HIT_RATE <y>` lines. Batches prefix each trace with
/// a `TRACE <name>` line
fn text_report(results: &[SimulationResult], batch: bool) -> String {
    let mut out = String::new();
    for result in results {
        if batch {
            out += &format!("TRACE {}\n", result.trace.as_deref().unwrap_or_default());
        }
        out += &format!("MPKI {}\nHIT_RATE {}\n", result.mpki, result.hit_rate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(trace: &str, mpki: f64, hit_rate: f64) -> SimulationResult {
        SimulationResult {
            trace: Some(trace.to_string()),
            policy: PolicyConfig::Belady,
            accesses: 10,
            misses: 4,
            evictions: 2,
            mpki,
            hit_rate,
        }
    }

    #[test]
    fn single_trace_report_holds_only_the_metrics() {
        let report = text_report(&[result("llm", 4.0, 0.6)], false);
        assert_eq!(report, "MPKI 4\nHIT_RATE 0.6\n");
    }

    #[test]
    fn batch_report_names_each_trace() {
        let report = text_report(&[result("a", 1.5, 0.25), result("b", 2.0, 0.5)], true);
        assert_eq!(report, "TRACE a\nMPKI 1.5\nHIT_RATE 0.25\nTRACE b\nMPKI 2\nHIT_RATE 0.5\n");
    }
}
