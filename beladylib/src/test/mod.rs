use crate::cache::{Cache, EvictionDecision};
use crate::error::CacheError;
use crate::future::InMemoryTrace;
use crate::replacement_policies::EvictionPolicy;
use crate::trace::{AccessTrace, TraceOptions};

mod policy_tests;

/// An unbounded in-memory trace with byte sized lines, the pc of each record is its index
pub(crate) fn trace_of(addresses: &[u64]) -> InMemoryTrace {
    aligned_trace(addresses, 1)
}

/// As `trace_of`, with addresses aligned to `line_size` as a cache with that line size expects
pub(crate) fn aligned_trace(addresses: &[u64], line_size: u64) -> InMemoryTrace {
    let options = TraceOptions::new(line_size).unwrap();
    InMemoryTrace::new(addresses.iter().enumerate().map(|(i, &a)| (i as u64, a)), &options)
}

/// Replays the rest of a trace through a cache, using the trace as the scoring context
pub(crate) fn replay<P: EvictionPolicy, T: AccessTrace>(
    cache: &mut Cache<P>,
    trace: &mut T,
) -> Result<Vec<EvictionDecision>, CacheError> {
    let mut decisions = Vec::new();
    while !trace.done() {
        let access = trace.advance()?;
        decisions.push(cache.read(access.pc, access.address, &*trace, &mut [])?);
    }
    Ok(decisions)
}

pub(crate) fn hits(decisions: &[EvictionDecision]) -> usize {
    decisions.iter().filter(|d| !d.is_miss()).count()
}
