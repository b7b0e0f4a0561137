use std::io::Cursor;

use beladylib::config::{CacheConfig, PolicyConfig, SimulationConfig};
use beladylib::future::InMemoryTrace;
use beladylib::simulator::Simulator;
use beladylib::trace::{Radix, TraceReader};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const ACCESSES: usize = 1 << 16;

fn config(policy: PolicyConfig, max_look_ahead: Option<usize>) -> SimulationConfig {
    SimulationConfig {
        cache: CacheConfig::new(64, 64 * 1024, 8),
        policy,
        seed: 0,
        instruction_count: ACCESSES as u64 * 4,
        max_look_ahead,
        radix: Radix::Hex,
        skip_header: false,
    }
}

/// A hot working set that fits in the cache, interleaved with a cold one that doesn't
fn synthetic_trace() -> Vec<(u64, u64)> {
    let mut rng = SmallRng::seed_from_u64(4202);
    (0..ACCESSES)
        .map(|i| {
            let line = if rng.gen_bool(0.7) { rng.gen_range(0..512) } else { rng.gen_range(512..16_384) };
            (0x400000 + (i as u64 % 64) * 4, line * 64 + rng.gen_range(0..64))
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let records = synthetic_trace();

    let mut group = c.benchmark_group("Policies");
    group.throughput(Throughput::Elements(ACCESSES as u64));
    for policy in [PolicyConfig::Belady, PolicyConfig::LeastRecentlyUsed, PolicyConfig::Random] {
        let conf = config(policy, None);
        let mut trace = InMemoryTrace::new(records.iter().copied(), &conf.trace_options().unwrap());
        group.bench_with_input(BenchmarkId::new("In memory", format!("{policy:?}")), &conf, |bench, conf| {
            bench.iter(|| {
                trace.rewind();
                Simulator::new(conf).unwrap().simulate(&mut trace, &mut []).unwrap();
            });
        });
    }
    group.finish();

    // Streaming parses the text on every iteration, the window bounds the index kept alongside it
    let text: String = records.iter().map(|(pc, address)| format!("{pc:x}, {address:x}\n")).collect();
    let mut group = c.benchmark_group("Streaming");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for window in [Some(1024), Some(16_384), None] {
        let conf = config(PolicyConfig::Belady, window);
        let options = conf.trace_options().unwrap();
        let label = window.map_or_else(|| "unbounded".to_string(), |w| w.to_string());
        group.bench_with_input(BenchmarkId::new("Look ahead", label), &conf, |bench, conf| {
            bench.iter(|| {
                let mut reader = TraceReader::new(Cursor::new(text.as_bytes()), options);
                Simulator::new(conf).unwrap().simulate(&mut reader, &mut []).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().significance_level(0.1).sample_size(10);
    targets = criterion_benchmark
);
criterion_main!(benches);
