//! Dotted version parsing and comparison.
//!
//! Recipe versions are up to four dot-separated non-negative integers
//! (`"1"`, `"1.2"`, `"10.0.3.7"`). Comparison zero-pads the shorter side, so
//! `1.2` and `1.2.0` are the same version.

use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Maximum number of dotted components in a version.
pub const MAX_COMPONENTS: usize = 4;

/// Parse a dotted version into its integer components.
///
/// The empty string parses to `[0]`.
pub fn parse(version: &str) -> Result<Vec<u32>> {
    if version.is_empty() {
        return Ok(vec![0]);
    }

    let invalid = |reason: String| Error::InvalidVersion {
        version: version.to_string(),
        reason,
    };

    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() > MAX_COMPONENTS {
        return Err(invalid(format!(
            "has {} components, at most {} allowed",
            parts.len(),
            MAX_COMPONENTS
        )));
    }

    parts
        .iter()
        .map(|p| {
            // u32::from_str accepts a leading '+', which is not a version digit.
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(format!("component '{}' is not a non-negative integer", p)));
            }
            p.parse::<u32>()
                .map_err(|e| invalid(format!("component '{}': {}", p, e)))
        })
        .collect()
}

/// Compare two parsed versions, zero-padding the shorter one.
pub fn compare(a: &[u32], b: &[u32]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => {}
            ord => return ord,
        }
    }
    Ordering::Equal
}

/// Returns true if `candidate` is strictly newer than the `stored` version.
///
/// An empty candidate is never greater, even against a stored `0`:
/// unversioned recipes never trigger an update.
pub fn greater(stored: &[u32], candidate: &str) -> Result<bool> {
    if candidate.is_empty() {
        return Ok(false);
    }
    let candidate = parse(candidate)?;
    Ok(compare(&candidate, stored) == Ordering::Greater)
}

/// Render parsed components back to dotted form.
pub fn format(version: &[u32]) -> String {
    version
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
