use std::collections::HashMap;
use std::io::BufRead;

use crate::error::TraceError;
use crate::trace::{Access, AccessTrace, FutureReferences, LookAhead, Score, TraceOptions, TraceReader};

/// Offline next-occurrence table over a complete address sequence.
///
/// Built with a single reverse pass: walking from the end, each address maps to the nearest
/// following position it was seen at, so every entry is filled in O(1). After the pass the same
/// map holds the first occurrence of every address, which answers queries for addresses that have
/// not been referenced yet
pub struct FutureReferenceIndex {
    next: Vec<Option<usize>>,
    first: HashMap<u64, usize>,
    look_ahead: LookAhead,
}

impl FutureReferenceIndex {
    pub fn build(addresses: &[u64], look_ahead: LookAhead) -> Self {
        let mut next = vec![None; addresses.len()];
        let mut following = HashMap::new();
        for (position, &address) in addresses.iter().enumerate().rev() {
            next[position] = following.insert(address, position);
        }
        Self {
            next,
            first: following,
            look_ahead,
        }
    }

    /// The smallest position after `position` referencing the same address
    pub fn next_occurrence(&self, position: usize) -> Option<usize> {
        self.next.get(position).copied().flatten()
    }

    pub fn first_occurrence(&self, address: u64) -> Option<usize> {
        self.first.get(&address).copied()
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    /// Scores `address` when the next unconsumed position is `at_position`.
    ///
    /// `previous` is the last position before `at_position` referencing `address`, or `None` if it
    /// hasn't been referenced yet. Occurrences at or beyond `at_position + window` are invisible
    pub fn score(&self, address: u64, previous: Option<usize>, at_position: usize) -> Score {
        let next = match previous {
            Some(position) => self.next_occurrence(position),
            None => self.first_occurrence(address),
        };
        match next {
            Some(next) if next >= at_position && next - at_position < self.look_ahead.capacity() => {
                Score::Finite((next + 1 - at_position) as u64)
            }
            _ => Score::Infinite,
        }
    }
}

/// A fully materialised trace, scored through a `FutureReferenceIndex`.
///
/// Interchangeable with `TraceReader`, and a lot more convenient for synthetic traces
pub struct InMemoryTrace {
    accesses: Vec<Access>,
    index: FutureReferenceIndex,
    look_ahead: LookAhead,
    last_seen: HashMap<u64, usize>,
    cursor: usize,
}

impl InMemoryTrace {
    /// Builds a trace from raw `(pc, address)` records, aligning addresses as the options specify
    pub fn new<I: IntoIterator<Item = (u64, u64)>>(records: I, options: &TraceOptions) -> Self {
        let accesses: Vec<Access> = records
            .into_iter()
            .map(|(pc, address)| Access {
                pc,
                address: options.align(address),
            })
            .collect();
        let addresses: Vec<u64> = accesses.iter().map(|a| a.address).collect();
        Self {
            index: FutureReferenceIndex::build(&addresses, options.look_ahead),
            look_ahead: options.look_ahead,
            accesses,
            last_seen: HashMap::new(),
            cursor: 0,
        }
    }

    /// Reads a whole trace into memory. Unlike the streaming reader, the first malformed line fails
    /// the load
    pub fn from_reader<R: BufRead>(source: R, options: &TraceOptions) -> Result<Self, TraceError> {
        let mut reader = TraceReader::new(source, options.with_look_ahead(LookAhead::Unbounded));
        let mut records = Vec::new();
        while !reader.done() {
            let access = reader.advance()?;
            records.push((access.pc, access.address));
        }
        Ok(Self::new(records, options))
    }

    pub fn len(&self) -> usize {
        self.accesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accesses.is_empty()
    }

    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    /// Rewinds to the start so the same trace can be replayed under another policy
    pub fn rewind(&mut self) {
        self.last_seen.clear();
        self.cursor = 0;
    }
}

impl FutureReferences for InMemoryTrace {
    fn next_use(&self, line_address: u64) -> Result<Score, TraceError> {
        Ok(self
            .index
            .score(line_address, self.last_seen.get(&line_address).copied(), self.cursor))
    }

    fn current(&self) -> Option<Access> {
        self.cursor.checked_sub(1).map(|i| self.accesses[i])
    }
}

impl AccessTrace for InMemoryTrace {
    fn peek(&self, k: usize) -> Result<Option<Access>, TraceError> {
        let window = self.look_ahead.capacity();
        if k >= window {
            return Err(TraceError::LookAheadExceeded { requested: k, window });
        }
        Ok(self.cursor.checked_add(k).and_then(|i| self.accesses.get(i)).copied())
    }

    fn advance(&mut self) -> Result<Access, TraceError> {
        let access = *self.accesses.get(self.cursor).ok_or(TraceError::Exhausted)?;
        self.last_seen.insert(access.address, self.cursor);
        self.cursor += 1;
        Ok(access)
    }

    fn done(&self) -> bool {
        self.cursor >= self.accesses.len()
    }

    fn position(&self) -> u64 {
        self.cursor as u64
    }
}
