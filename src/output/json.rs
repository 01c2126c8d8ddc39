//! JSON output for run records.

use super::RunRecord;
use std::io::{self, Write};

/// Write records as a pretty-printed JSON array.
pub fn write_json<W: Write>(out: &mut W, records: &[RunRecord]) -> io::Result<()> {
    let json = serde_json::to_string_pretty(records).map_err(io::Error::other)?;
    writeln!(out, "{}", json)
}
