//! Plain text output for run records.

use super::RunRecord;
use std::io::{self, Write};

/// Write records as tab-separated lines.
///
/// Newlines in plugin output are escaped so each record stays on one line.
pub fn write_plain<W: Write>(out: &mut W, records: &[RunRecord]) -> io::Result<()> {
    if records.is_empty() {
        return writeln!(out, "No commands run.");
    }

    writeln!(out, "EXIT\tDURATION\tCOMMAND\tOUTPUT")?;
    for record in records {
        let text = match record.error {
            Some(ref error) => format!("error: {}", error),
            None => escape(record.output.trim_end_matches('\n')),
        };
        writeln!(
            out,
            "{}\t{}ms\t{}\t{}",
            record.exit_code, record.duration_ms, record.command, text
        )?;
    }
    Ok(())
}

fn escape(text: &str) -> String {
    text.replace('\t', "\\t").replace('\n', "\\n")
}
