use std::collections::{HashMap, VecDeque};
use std::io::BufRead;
use std::num::{NonZeroU64, NonZeroUsize};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TraceError};
use crate::hex::{HEX_DIGITS, INVALID_DIGIT};

/// A single recorded memory access. The address is aligned down to the cache line it falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Access {
    pub pc: u64,
    pub address: u64,
}

/// How far in the future an address is next referenced, or how attractive a line is to evict.
///
/// `Infinite` is greater than every finite score, the derived ordering relies on the variant order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Score {
    Finite(u64),
    Infinite,
}

impl Score {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Score::Infinite)
    }
}

/// Number base used by every integer field of a trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Radix {
    /// Hexadecimal, with or without a `0x` prefix
    #[default]
    #[serde(alias = "hexadecimal")]
    Hex,
    #[serde(alias = "dec")]
    Decimal,
}

/// The span of future accesses visible to a scorer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LookAhead {
    /// The whole remaining trace, needed for true Belady-optimal eviction
    #[default]
    Unbounded,
    Window(NonZeroUsize),
}

impl LookAhead {
    /// Maps an optional configured window to a look-ahead. `None` means unbounded, zero is rejected
    pub fn from_config(max_look_ahead: Option<usize>) -> Result<Self, ConfigError> {
        match max_look_ahead {
            None => Ok(LookAhead::Unbounded),
            Some(n) => NonZeroUsize::new(n)
                .map(LookAhead::Window)
                .ok_or(ConfigError::Zero { field: "max_look_ahead" }),
        }
    }

    /// The number of accesses that may be buffered, `usize::MAX` when unbounded
    pub fn capacity(&self) -> usize {
        match self {
            LookAhead::Unbounded => usize::MAX,
            LookAhead::Window(n) => n.get(),
        }
    }
}

/// Options for reading a trace
#[derive(Debug, Clone, Copy)]
pub struct TraceOptions {
    pub line_size: NonZeroU64,
    pub look_ahead: LookAhead,
    pub radix: Radix,
    pub skip_header: bool,
}

impl TraceOptions {
    pub fn new(line_size: u64) -> Result<Self, ConfigError> {
        let line_size = NonZeroU64::new(line_size).ok_or(ConfigError::Zero { field: "line_size" })?;
        Ok(Self {
            line_size,
            look_ahead: LookAhead::Unbounded,
            radix: Radix::Hex,
            skip_header: false,
        })
    }

    pub fn with_look_ahead(mut self, look_ahead: LookAhead) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    pub fn with_radix(mut self, radix: Radix) -> Self {
        self.radix = radix;
        self
    }

    pub fn with_skip_header(mut self, skip_header: bool) -> Self {
        self.skip_header = skip_header;
        self
    }

    /// Aligns an address down to the start of its cache line
    pub fn align(&self, address: u64) -> u64 {
        address - address % self.line_size.get()
    }
}

/// Answers "when is this line address next referenced?" relative to the most recently consumed
/// access. This is the scoring context handed to eviction policies
pub trait FutureReferences {
    /// Distance, in accesses, from the current access to the next one referencing `line_address`.
    ///
    /// A reference by the very next access has distance 1. `Score::Infinite` means the address is
    /// not referenced again within the look-ahead window
    fn next_use(&self, line_address: u64) -> Result<Score, TraceError>;

    /// The access most recently consumed from the trace, if any
    fn current(&self) -> Option<Access>;
}

/// Scoring context for runs which have no view of the future. Any attempt to use it fails
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookAhead;

impl FutureReferences for NoLookAhead {
    fn next_use(&self, _line_address: u64) -> Result<Score, TraceError> {
        Err(TraceError::LookAheadUnavailable)
    }

    fn current(&self) -> Option<Access> {
        None
    }
}

/// A sequential source of accesses with bounded look-ahead
pub trait AccessTrace: FutureReferences {
    /// Inspects the access `k` positions past the cursor without consuming anything. `peek(0)` is
    /// the access the next `advance` returns. `None` marks the end of the visible trace
    fn peek(&self, k: usize) -> Result<Option<Access>, TraceError>;

    /// Consumes and returns the next access
    fn advance(&mut self) -> Result<Access, TraceError>;

    /// Whether every access has been consumed
    fn done(&self) -> bool;

    /// The number of accesses consumed so far
    fn position(&self) -> u64;
}

/// Streams accesses from any buffered source, keeping up to the look-ahead window of upcoming
/// accesses in memory along with an index of where each line address recurs inside it.
///
/// Format errors do not poison the reader. A bad line takes no position in the trace, its error
/// is queued against the position of the access which follows it and returned by the `advance`
/// call that would have produced the line. Buffering carries on past it, so `peek` and `next_use`
/// see through bad lines, and a caller which carries on afterwards skips the line
pub struct TraceReader<R> {
    source: R,
    options: TraceOptions,
    line_buffer: Vec<u8>,
    lines_read: u64,
    header_pending: bool,
    exhausted: bool,
    // (position of the next valid access, error), in stream order
    errors: VecDeque<(u64, TraceError)>,
    look_ahead: VecDeque<Access>,
    // Line address -> absolute positions of its buffered occurrences, in increasing order
    positions: HashMap<u64, VecDeque<u64>>,
    cursor: u64,
    current: Option<Access>,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(source: R, options: TraceOptions) -> Self {
        let mut reader = Self {
            source,
            options,
            line_buffer: Vec::new(),
            lines_read: 0,
            header_pending: options.skip_header,
            exhausted: false,
            errors: VecDeque::new(),
            look_ahead: VecDeque::new(),
            positions: HashMap::new(),
            cursor: 0,
            current: None,
        };
        reader.fill();
        reader
    }

    /// Number of source lines read so far, including a skipped header
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    fn fill(&mut self) {
        let capacity = self.options.look_ahead.capacity();
        while self.look_ahead.len() < capacity && !self.exhausted {
            let position = self.cursor + self.look_ahead.len() as u64;
            match self.next_record() {
                Ok(Some(access)) => {
                    self.positions.entry(access.address).or_default().push_back(position);
                    self.look_ahead.push_back(access);
                }
                Ok(None) => self.exhausted = true,
                Err(e @ TraceError::Format { .. }) => self.errors.push_back((position, e)),
                // The source itself failed, nothing after this can be trusted
                Err(e) => {
                    self.errors.push_back((position, e));
                    self.exhausted = true;
                }
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<Access>, TraceError> {
        loop {
            self.line_buffer.clear();
            if self.source.read_until(b'\n', &mut self.line_buffer)? == 0 {
                return Ok(None);
            }
            self.lines_read += 1;
            if self.header_pending {
                self.header_pending = false;
                continue;
            }
            let format_error = |reason| TraceError::Format {
                line: self.lines_read,
                reason,
            };
            let line = std::str::from_utf8(&self.line_buffer)
                .map_err(|e| format_error(format!("not valid UTF-8 ({e})")))?
                .trim_end_matches(['\n', '\r']);
            let (pc, address) = parse_record(line, self.options.radix).map_err(format_error)?;
            return Ok(Some(Access {
                pc,
                address: self.options.align(address),
            }));
        }
    }
}

impl<R: BufRead> FutureReferences for TraceReader<R> {
    fn next_use(&self, line_address: u64) -> Result<Score, TraceError> {
        Ok(match self.positions.get(&line_address).and_then(|p| p.front()) {
            // Buffered positions are never behind the cursor
            Some(&next) => Score::Finite(next + 1 - self.cursor),
            None => Score::Infinite,
        })
    }

    fn current(&self) -> Option<Access> {
        self.current
    }
}

impl<R: BufRead> AccessTrace for TraceReader<R> {
    fn peek(&self, k: usize) -> Result<Option<Access>, TraceError> {
        let window = self.options.look_ahead.capacity();
        if k >= window {
            return Err(TraceError::LookAheadExceeded { requested: k, window });
        }
        Ok(self.look_ahead.get(k).copied())
    }

    fn advance(&mut self) -> Result<Access, TraceError> {
        if matches!(self.errors.front(), Some((position, _)) if *position == self.cursor) {
            if let Some((_, error)) = self.errors.pop_front() {
                return Err(error);
            }
        }
        let access = self.look_ahead.pop_front().ok_or(TraceError::Exhausted)?;
        if let Some(occurrences) = self.positions.get_mut(&access.address) {
            debug_assert_eq!(occurrences.front(), Some(&self.cursor));
            occurrences.pop_front();
            if occurrences.is_empty() {
                self.positions.remove(&access.address);
            }
        }
        self.cursor += 1;
        self.current = Some(access);
        self.fill();
        Ok(access)
    }

    fn done(&self) -> bool {
        self.look_ahead.is_empty() && self.exhausted && self.errors.is_empty()
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

/// Parses one `program_counter, address` record
///
/// # Examples
///
/// ```
/// use beladylib::trace::{parse_record, Radix};
/// assert_eq!(parse_record("0x401000, 7fff0040", Radix::Hex), Ok((0x401000, 0x7fff0040)));
/// assert_eq!(parse_record("12,64", Radix::Decimal), Ok((12, 64)));
/// ```
pub fn parse_record(line: &str, radix: Radix) -> Result<(u64, u64), String> {
    let mut fields = line.split(',');
    let (Some(pc), Some(address), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(format!("expected `program_counter, address`, got {line:?}"));
    };
    Ok((
        parse_field(pc.trim(), radix).map_err(|e| format!("program counter: {e}"))?,
        parse_field(address.trim(), radix).map_err(|e| format!("address: {e}"))?,
    ))
}

fn parse_field(field: &str, radix: Radix) -> Result<u64, String> {
    if field.starts_with('-') {
        return Err(format!("negative value {field:?}"));
    }
    match radix {
        Radix::Hex => parse_hex(field.as_bytes()).ok_or_else(|| format!("{field:?} is not a 64-bit hexadecimal value")),
        Radix::Decimal => field
            .parse::<u64>()
            .map_err(|e| format!("{field:?} is not a 64-bit decimal value ({e})")),
    }
}

/// Parses a hexadecimal value of any length up to 64 bits, with an optional `0x` prefix.
///
/// Uses the digit lookup table generated by build.rs, rejecting bytes which aren't hex digits and
/// values which overflow
///
/// # Examples
///
/// ```
/// use beladylib::trace::parse_hex;
/// assert_eq!(parse_hex(b"0x00000000000000ff"), Some(255));
/// assert_eq!(parse_hex(b"A"), Some(10));
/// assert_eq!(parse_hex(b"0x"), None);
/// ```
pub fn parse_hex(buf: &[u8]) -> Option<u64> {
    let digits = buf
        .strip_prefix(b"0x")
        .or_else(|| buf.strip_prefix(b"0X"))
        .unwrap_or(buf);
    if digits.is_empty() {
        return None;
    }
    let mut res: u64 = 0;
    for &byte in digits {
        let digit = HEX_DIGITS[byte as usize];
        if digit == INVALID_DIGIT || res >> 60 != 0 {
            return None;
        }
        res = res << 4 | digit as u64;
    }
    Some(res)
}
