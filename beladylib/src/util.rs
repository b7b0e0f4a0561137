use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches the access traces dumped by the architecture simulator, e.g. `llm_access_trace.csv`
    pub static ref DEFAULT_TRACE_PATTERN: Regex =
        Regex::new(r"^(?P<name>[0-9a-zA-Z_.-]+?)(?:_access_trace)?\.csv$").unwrap();
}

/// A trace file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePath {
    /// The `name` capture of the pattern, or the file name when the pattern has no such group
    pub name: String,
    pub path: PathBuf,
}

/// Finds the trace files in a directory whose names match `pattern`, sorted by file name
pub fn discover_traces(directory: &Path, pattern: &Regex) -> io::Result<Vec<TracePath>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        // Non UTF-8 names can't match a pattern anyway
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        let Some(captures) = pattern.captures(&file_name) else {
            continue;
        };
        let name = captures
            .name("name")
            .map_or_else(|| file_name.clone(), |m| m.as_str().to_string());
        out.push(TracePath { name, path: entry.path() });
    }
    out.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(out)
}
