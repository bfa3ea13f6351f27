//! Release-version parsing, vendor classification, and total ordering.
//!
//! Fix versions arrive as raw strings in two grammars: dotted
//! (`11.0.9`, `11.0.9.1`) and legacy update (`8u321`). Either may carry a
//! vendor marker: the `-oracle` suffix for the vendor train, or the
//! `openjdk` prefix used by the open train of the legacy releases.
//! Stripping the markers yields values comparable across both trains.

use std::cmp::Ordering;

use thiserror::Error;

/// Suffix marking a vendor-train fix version.
pub const ORACLE_SUFFIX: &str = "-oracle";

/// Prefix carried by open-train fix versions of the legacy update trains.
pub const OPEN_PREFIX: &str = "openjdk";

/// Fix-version values produced while both trains still shipped from the
/// joint repository. A fix landing in one of these is present in both
/// trains, so it is exempt from parity accounting.
pub const SHARED_VERSIONS: &[&str] = &[
    "11.0.1", "11.0.2", "12.0.1", "12.0.2", "13.0.1", "13.0.2", "14.0.1",
    "14.0.2", "15.0.1", "15.0.2", "16.0.1", "16.0.2", "17.0.1", "17.0.2",
];

/// Error produced when a string does not match the release-version grammar.
///
/// Callers skip the offending entry with a warning rather than aborting:
/// losing one malformed entry is preferable to discarding a whole train.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("malformed release version: '{raw}'")]
    Malformed { raw: String },
}

/// Which release train a fix version belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    /// Open release train.
    Open,
    /// Vendor (Oracle) release train.
    Oracle,
    /// Produced before the trains split; valid against both.
    Shared,
}

/// Classify a raw fix-version string into its release train.
///
/// Pure function of the raw string: the `-oracle` suffix selects
/// [`Vendor::Oracle`], membership in [`SHARED_VERSIONS`] selects
/// [`Vendor::Shared`], everything else is [`Vendor::Open`].
pub fn classify(raw: &str) -> Vendor {
    if raw.ends_with(ORACLE_SUFFIX) {
        Vendor::Oracle
    } else if SHARED_VERSIONS.contains(&raw) {
        Vendor::Shared
    } else {
        Vendor::Open
    }
}

/// Remove vendor markers, producing a value comparable across trains.
pub fn strip_vendor(raw: &str) -> &str {
    let s = raw.strip_suffix(ORACLE_SUFFIX).unwrap_or(raw);
    s.strip_prefix(OPEN_PREFIX).unwrap_or(s)
}

/// Major release component, e.g. `11` for `"11.0.9"` and `8` for `"8u321"`.
pub fn parse_major(raw: &str) -> Result<u32, VersionError> {
    Ok(components(raw)?[0])
}

/// Minor release component; `0` for legacy update versions.
pub fn parse_minor(raw: &str) -> Result<u32, VersionError> {
    Ok(components(raw)?[1])
}

/// Update component, e.g. `9` for `"11.0.9"` and `321` for `"8u321"`.
pub fn parse_update(raw: &str) -> Result<u32, VersionError> {
    Ok(components(raw)?[2])
}

/// Patch component, e.g. `1` for `"11.0.9.1"`; `0` when absent.
pub fn parse_patch(raw: &str) -> Result<u32, VersionError> {
    Ok(components(raw)?[3])
}

/// Total order over release versions.
///
/// Both sides are vendor-stripped and compared component-wise
/// (major, minor, update, patch), missing trailing components reading as 0.
/// Two distinct stripped strings compare equal only when numerically
/// identical, so `"11.0.10"` and `"11.0.10-oracle"` are equal while
/// `"11.0.9"` sorts before `"11.0.10"`.
pub fn compare(a: &str, b: &str) -> Result<Ordering, VersionError> {
    Ok(components(a)?.cmp(&components(b)?))
}

/// Numeric components (major, minor, update, patch) after vendor stripping.
fn components(raw: &str) -> Result<[u32; 4], VersionError> {
    let s = strip_vendor(raw).trim();
    if s.is_empty() {
        return Err(malformed(raw));
    }

    // Legacy update grammar: "<major>u<update>".
    if let Some((major, update)) = s.split_once('u') {
        return Ok([parse_num(major, raw)?, 0, parse_num(update, raw)?, 0]);
    }

    let mut out = [0u32; 4];
    let mut idx = 0;
    for part in s.split('.') {
        if idx >= out.len() {
            return Err(malformed(raw));
        }
        out[idx] = parse_num(part, raw)?;
        idx += 1;
    }
    Ok(out)
}

fn parse_num(part: &str, raw: &str) -> Result<u32, VersionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(raw));
    }
    part.parse().map_err(|_| malformed(raw))
}

fn malformed(raw: &str) -> VersionError {
    VersionError::Malformed {
        raw: raw.to_string(),
    }
}
