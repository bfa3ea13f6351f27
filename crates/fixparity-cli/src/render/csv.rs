//! CSV parity report.

use std::io::{self, Write};

use fixparity_core::{ParityEntry, ParityModel, VersionBuckets};

use crate::render::ReportRenderer;

const HEADER: &[&str] = &[
    "bugid",
    "creationDate",
    "priority",
    "component",
    "openRelease",
    "oracleRelease",
    "interest",
    "backportRQ",
    "summary",
    "description",
];

/// Machine-readable report: vendor-only rows first, then open-only, both in
/// version-then-key order.
pub struct CsvRenderer;

impl ReportRenderer for CsvRenderer {
    fn render(&self, model: &ParityModel, out: &mut dyn Write) -> io::Result<()> {
        write_row(out, HEADER.iter().copied())?;
        write_buckets(out, model.only_oracle())?;
        write_buckets(out, model.only_open())?;
        Ok(())
    }
}

fn write_buckets(out: &mut dyn Write, buckets: &VersionBuckets) -> io::Result<()> {
    for rows in buckets.values() {
        for entry in rows.values() {
            write_entry(out, entry)?;
        }
    }
    Ok(())
}

fn write_entry(out: &mut dyn Write, entry: &ParityEntry) -> io::Result<()> {
    let issue = &entry.issue;
    let created = issue
        .created
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let fields = [
        issue.key.as_str(),
        created.as_str(),
        issue.priority.as_deref().unwrap_or(""),
        &issue.components.join(","),
        entry.first_open_raw.as_str(),
        entry.first_oracle_raw.as_str(),
        entry.interest_tags.as_str(),
        if entry.backport_requested { "bp" } else { "" },
        issue.summary.as_str(),
        issue.description.as_deref().unwrap_or(""),
    ];
    write_row(out, fields.into_iter())
}

fn write_row<'a>(out: &mut dyn Write, fields: impl Iterator<Item = &'a str>) -> io::Result<()> {
    let line = fields.map(escape).collect::<Vec<_>>().join(",");
    writeln!(out, "{line}")
}

/// Quote every field; internal quotes are doubled per RFC 4180.
fn escape(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
