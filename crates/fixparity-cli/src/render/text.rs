//! Plain-text parity report.

use std::io::{self, Write};

use fixparity_core::{ParityModel, VersionBuckets};

use crate::render::ReportRenderer;

/// Human-readable report: one section per bucket, groups ordered by version
/// string, rows by issue key.
pub struct TextRenderer {
    /// Also print the both-trains relative-order sections.
    pub verbose: bool,
}

impl ReportRenderer for TextRenderer {
    fn render(&self, model: &ParityModel, out: &mut dyn Write) -> io::Result<()> {
        section(out, "FIXES ONLY IN THE VENDOR TRAIN", model.only_oracle())?;
        section(out, "FIXES ONLY IN THE OPEN TRAIN", model.only_open())?;

        if self.verbose {
            section(out, "EQUAL VERSIONS, OPEN RESOLVED FIRST", model.exact_open_first())?;
            section(
                out,
                "EQUAL VERSIONS, VENDOR RESOLVED FIRST",
                model.exact_oracle_first(),
            )?;
            section(out, "EQUAL VERSIONS, ORDER UNKNOWN", model.exact_unknown())?;
            section(out, "OPEN SHIPPED AN EARLIER VERSION", model.late_open_first())?;
            section(out, "VENDOR SHIPPED AN EARLIER VERSION", model.late_oracle_first())?;
        }

        if !model.shared().is_empty() {
            writeln!(out, "Excluded as already at parity: {}", model.shared().len())?;
        }
        if !model.inconsistent().is_empty() {
            writeln!(
                out,
                "Excluded as inconsistent: {}",
                model.inconsistent().len()
            )?;
        }
        Ok(())
    }
}

fn section(out: &mut dyn Write, title: &str, buckets: &VersionBuckets) -> io::Result<()> {
    let total: usize = buckets.values().map(|rows| rows.len()).sum();
    writeln!(out, "{title} ({total} issues):")?;
    writeln!(out)?;
    for (version, rows) in buckets {
        writeln!(out, "{version} ({} issues):", rows.len())?;
        for (key, entry) in rows {
            writeln!(
                out,
                "  {:<14} {:<14} {}: {}",
                entry.first_open_raw, entry.first_oracle_raw, key, entry.issue.summary
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}
