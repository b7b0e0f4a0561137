use std::fs::File;
use std::io::{self, BufRead, Cursor, Read};
use std::path::Path;

use crate::error::TraceError;
use crate::trace::{TraceOptions, TraceReader};

/// The bytes behind a trace file, memory mapped where the platform allows it
pub enum TraceSource {
    #[cfg(unix)]
    Mapped(Cursor<memmap2::Mmap>),
    #[cfg(not(unix))]
    Buffered(std::io::BufReader<File>),
    Memory(Cursor<Vec<u8>>),
}

impl Read for TraceSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            TraceSource::Mapped(c) => c.read(buf),
            #[cfg(not(unix))]
            TraceSource::Buffered(r) => r.read(buf),
            TraceSource::Memory(c) => c.read(buf),
        }
    }
}

impl BufRead for TraceSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            #[cfg(unix)]
            TraceSource::Mapped(c) => c.fill_buf(),
            #[cfg(not(unix))]
            TraceSource::Buffered(r) => r.fill_buf(),
            TraceSource::Memory(c) => c.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            #[cfg(unix)]
            TraceSource::Mapped(c) => c.consume(amt),
            #[cfg(not(unix))]
            TraceSource::Buffered(r) => r.consume(amt),
            TraceSource::Memory(c) => c.consume(amt),
        }
    }
}

pub fn get_source(file: File) -> Result<TraceSource, TraceError> {
    // Mapping an empty file fails on some platforms
    if file.metadata()?.len() == 0 {
        return Ok(TraceSource::Memory(Cursor::new(Vec::new())));
    }
    // Compatibility on other systems
    #[cfg(not(unix))]
    {
        // Traces are read strictly front to back, a large buffer keeps the number of reads down
        use std::io::BufReader;
        const BUFFER_SIZE: usize = 64 * 4096;
        Ok(TraceSource::Buffered(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
    // Memory map the file for speed on unix systems
    #[cfg(unix)]
    {
        use memmap2::{Advice, Mmap};
        // Safety: the mapping is private to the reader, and traces are not modified while a run
        // replays them
        unsafe {
            let m = Mmap::map(&file)?;
            m.advise(Advice::Sequential)?;
            Ok(TraceSource::Mapped(Cursor::new(m)))
        }
    }
}

/// Opens a trace file for replay. The file is unmapped when the reader is dropped, whichever way
/// the run ends
pub fn open_trace(path: &Path, options: TraceOptions) -> Result<TraceReader<TraceSource>, TraceError> {
    let file = File::open(path).map_err(|source| TraceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), ?options, "opening trace");
    Ok(TraceReader::new(get_source(file)?, options))
}
