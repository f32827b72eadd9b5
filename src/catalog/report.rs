//! Parse the plain text burst lists published by the e-Callisto network.
//!
//! A list looks like
//!
//! ```text
//! #Date    Time          Type   Stations
//! ...7 more header lines...
//! 20210301 01:08-01:08   III    ALASKA-HAARP
//! 20210301 03:34-03:36   III    ALASKA-COHOE, (Australia-ASSA)
//! ```

use super::BurstRecord;
use crate::{filename::parse_date, CallistoResult};
use chrono::NaiveTime;
use log::{debug, info};
use std::path::Path;

/// Number of lines at the top of every list before the data rows start.
pub const HEADER_LINES: usize = 8;

/// Parse a whole burst list into records, one per station per row.
///
/// Malformed rows are skipped.
pub fn parse_report(text: &str) -> Vec<BurstRecord> {
    text.lines()
        .skip(HEADER_LINES)
        .flat_map(|line| {
            let records = parse_row(line);
            if records.is_empty() && !line.trim().is_empty() {
                debug!(target: "report", "skipping row: {}", line);
            }
            records
        })
        .collect()
}

/// Read and parse several burst lists.
///
/// Fails if any list can't be read or if none of them hold a record, so a bad path never ends up
/// replacing a catalog with nothing.
pub fn read_reports<P: AsRef<Path>>(paths: &[P]) -> CallistoResult<Vec<BurstRecord>> {
    let mut records = vec![];

    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| format!("unable to read {}: {}", path.display(), err))?;

        let parsed = parse_report(&text);
        info!(target: "report", "{}: {} records", path.display(), parsed.len());
        records.extend(parsed);
    }

    if records.is_empty() {
        return Err("no burst records found".into());
    }

    Ok(records)
}

/// Parse one data row. Returns an empty list for malformed rows.
pub fn parse_row(line: &str) -> Vec<BurstRecord> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return vec![];
    }

    let time_range = tokens[1];

    // Cheap check that this is a data row at all.
    if !time_range
        .chars()
        .next()
        .map(|c| c.is_ascii_digit())
        .unwrap_or(false)
    {
        return vec![];
    }

    // Only HH:MM-HH:MM. A single digit hour like 00:11-0:13 can't be trusted.
    let (start, end) = match parse_time_range(time_range) {
        Some(v) => v,
        None => return vec![],
    };

    let date = match parse_date(tokens[0]) {
        Some(d) => d,
        None => return vec![],
    };

    let burst_type = clean_burst_type(tokens[2]);

    tokens[3..]
        .iter()
        .map(|station| clean_station(station))
        .filter(|station| !station.is_empty())
        .map(|station| BurstRecord {
            station,
            date,
            start,
            end,
            burst_type: burst_type.clone(),
        })
        .collect()
}

fn parse_time_range(range: &str) -> Option<(NaiveTime, NaiveTime)> {
    if range.len() != 11 || !range.is_ascii() {
        return None;
    }

    let bytes = range.as_bytes();
    if bytes[2] != b':' || bytes[5] != b'-' || bytes[8] != b':' {
        return None;
    }

    let hm = |h: &str, m: &str| -> Option<NaiveTime> {
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
    };

    let start = hm(&range[..2], &range[3..5])?;
    let end = hm(&range[6..8], &range[9..])?;

    Some((start, end))
}

/// Strip the punctuation that separates station names in a list.
pub fn clean_station(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '[' | ']' | '/'))
        .collect()
}

/// Make a burst type code safe to use in a file name.
pub fn clean_burst_type(raw: &str) -> String {
    raw.replace('/', "-").replace('?', "X")
}
