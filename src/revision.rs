use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Revision reported for a missing or unreadable descriptor; older than anything real.
pub const UNKNOWN_REVISION: i64 = -1;

/// Only the head of the descriptor is scanned.
const PROBE_LIMIT: u64 = 1024;

/// Read the `rev = N` marker from the first 1KB of `descriptor`.
///
/// Returns [`UNKNOWN_REVISION`] on any failure so source selection stays total.
pub fn probe_revision(descriptor: &Path) -> i64 {
    match read_revision(descriptor) {
        Ok(Some(rev)) => rev,
        Ok(None) => {
            tracing::debug!(file = %descriptor.display(), "no revision marker");
            UNKNOWN_REVISION
        }
        Err(err) => {
            tracing::debug!(file = %descriptor.display(), "revision probe failed: {err}");
            UNKNOWN_REVISION
        }
    }
}

fn read_revision(descriptor: &Path) -> std::io::Result<Option<i64>> {
    let mut head = Vec::with_capacity(PROBE_LIMIT as usize);
    std::fs::File::open(descriptor)?
        .take(PROBE_LIMIT)
        .read_to_end(&mut head)?;
    Ok(parse_revision(&String::from_utf8_lossy(&head)))
}

/// Revisions past `i64::MAX` saturate, so an oversized revision still counts as newest.
fn parse_revision(text: &str) -> Option<i64> {
    static REV: OnceLock<Regex> = OnceLock::new();
    let re = REV.get_or_init(|| Regex::new(r"rev = ([0-9]+)").expect("static regex"));
    let digits = re.captures(text)?.get(1)?.as_str();
    // Only overflow can fail here: the capture is one or more ASCII digits.
    Some(digits.parse().unwrap_or(i64::MAX))
}
