/*! Decide which observation files hold a reported burst.
 *
 * Each archive file covers a fixed 15 minute window starting at the time in its name. Burst
 * reports give a start and end to the minute on the same calendar day as the file.
 */

use crate::{
    error::ParseError,
    filename::{parse_hhmm, ArchiveFileName},
};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use log::warn;
use std::{
    collections::BTreeSet,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

/// Length of one observation file in minutes.
pub const OBSERVATION_MINUTES: i64 = 15;

/// The reported start and end of a burst, to the minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl BurstWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        BurstWindow { start, end }
    }

    /// Build from two `HHMM` strings.
    pub fn from_hhmm(start: &str, end: &str) -> Result<Self, ParseError> {
        let s = parse_hhmm(start).ok_or_else(|| ParseError::new("invalid burst start", start))?;
        let e = parse_hhmm(end).ok_or_else(|| ParseError::new("invalid burst end", end))?;
        Ok(BurstWindow::new(s, e))
    }

    pub fn start_hhmm(&self) -> String {
        self.start.format("%H%M").to_string()
    }

    pub fn end_hhmm(&self) -> String {
        self.end.format("%H%M").to_string()
    }

    /// Burst start and end on the day of the file, carrying the file's seconds so every
    /// comparison is in whole minutes relative to the file start.
    fn anchored(&self, file_start: &NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let day = file_start.date();
        let sec = file_start.second();

        let start = day.and_hms(self.start.hour(), self.start.minute(), sec);
        let end = day.and_hms(self.end.hour(), self.end.minute(), sec);

        (start, end)
    }
}

/// Check whether a file's observation window could hold any part of the burst.
///
/// The file is in range when its start lies in `[burst_start - 14 min, burst_end - 1 min]`. When
/// `include_long_bursts` is false, bursts reported as lasting more than one observation window
/// are rejected outright. Reports of such long bursts often cover stretches with nothing in them.
pub fn file_in_window(
    fname: &str,
    window: &BurstWindow,
    include_long_bursts: bool,
) -> Result<bool, ParseError> {
    let file = ArchiveFileName::parse(fname)?;
    Ok(start_in_window(&file.start, window, include_long_bursts))
}

fn start_in_window(
    file_start: &NaiveDateTime,
    window: &BurstWindow,
    include_long_bursts: bool,
) -> bool {
    let (burst_start, burst_end) = window.anchored(file_start);

    let earliest = burst_start - Duration::minutes(OBSERVATION_MINUTES - 1);
    let latest = burst_end - Duration::minutes(1);

    let in_range = earliest <= *file_start && *file_start <= latest;

    if include_long_bursts {
        in_range
    } else {
        in_range && burst_end - burst_start <= Duration::minutes(OBSERVATION_MINUTES)
    }
}

/// Find which of `num_splits` equal segments of a file overlap the burst.
///
/// Offsets are in minutes from the file start, clamped to the file. The burst covers the
/// half-open interval `[start, end)`, but a zero length burst still marks the segment holding
/// it. A burst entirely outside the file yields an empty set.
pub fn segment_indices(
    fname: &str,
    window: &BurstWindow,
    num_splits: usize,
) -> Result<BTreeSet<usize>, ParseError> {
    let file = ArchiveFileName::parse(fname)?;
    Ok(segments_for_start(&file.start, window, num_splits))
}

pub(crate) fn segments_for_start(
    file_start: &NaiveDateTime,
    window: &BurstWindow,
    num_splits: usize,
) -> BTreeSet<usize> {
    let mut indices = BTreeSet::new();
    if num_splits == 0 {
        return indices;
    }

    let (burst_start, burst_end) = window.anchored(file_start);
    let total = OBSERVATION_MINUTES as f64;

    let start_off = (burst_start - *file_start).num_seconds() as f64 / 60.0;
    let end_off = (burst_end - *file_start).num_seconds() as f64 / 60.0;

    let outside = if end_off == start_off {
        start_off < 0.0 || start_off >= total
    } else {
        end_off <= 0.0 || start_off >= total || end_off < start_off
    };
    if outside {
        return indices;
    }

    let start_off = start_off.max(0.0);
    let end_off = end_off.min(total);

    let width = total / num_splits as f64;
    let last = num_splits - 1;

    let first_idx = ((start_off / width).floor() as usize).min(last);
    let last_idx = ((end_off / width).ceil() as usize)
        .saturating_sub(1)
        .min(last)
        .max(first_idx);

    indices.extend(first_idx..=last_idx);
    indices
}

/// Append-only record of file names that could not be matched.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ErrorLog {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `file\tstart\tend` line.
    pub fn record(&self, fname: &str, start: &str, end: &str) -> std::io::Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        // One write call per line so lines from different workers don't interleave.
        let line = format!("{}\t{}\t{}\n", fname, start, end);
        f.write_all(line.as_bytes())
    }
}

/// The matcher as the planner uses it: parse failures are logged, never raised.
#[derive(Debug, Clone)]
pub struct BurstMatcher {
    include_long_bursts: bool,
    error_log: Option<ErrorLog>,
}

impl BurstMatcher {
    pub fn new(include_long_bursts: bool, error_log: Option<ErrorLog>) -> Self {
        BurstMatcher {
            include_long_bursts,
            error_log,
        }
    }

    pub fn include_long_bursts(&self) -> bool {
        self.include_long_bursts
    }

    /// True if the file could hold the burst. Unparseable names count as no match.
    pub fn matches(&self, fname: &str, window: &BurstWindow) -> bool {
        match file_in_window(fname, window, self.include_long_bursts) {
            Ok(in_range) => in_range,
            Err(err) => {
                warn!(target: "matcher", "excluding {}: {}", fname, err);

                if let Some(ref log) = self.error_log {
                    if let Err(io_err) =
                        log.record(fname, &window.start_hhmm(), &window.end_hhmm())
                    {
                        warn!(target: "matcher", "error writing {}: {}", log.path().display(), io_err);
                    }
                }

                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn window(start: &str, end: &str) -> BurstWindow {
        BurstWindow::from_hhmm(start, end).unwrap()
    }

    fn set(indices: &[usize]) -> BTreeSet<usize> {
        indices.iter().copied().collect()
    }

    const FILE: &str = "ALASKA-HAARP_20210301_010000_01.fit.gz";

    #[test]
    fn test_start_boundary() {
        // File starts at 01:00, so burst starts 14 and 15 minutes later.
        assert!(file_in_window(FILE, &window("0114", "0120"), false).unwrap());
        assert!(!file_in_window(FILE, &window("0115", "0120"), false).unwrap());
    }

    #[test]
    fn test_end_boundary() {
        // File at exactly burst_end - 1 min is in, at burst_end it is not.
        assert!(file_in_window(FILE, &window("0050", "0101"), false).unwrap());
        assert!(!file_in_window(FILE, &window("0050", "0100"), false).unwrap());
    }

    #[test]
    fn test_seconds_follow_the_file() {
        let fname = "GLASGOW_20210301_004607_01.fit.gz";
        assert!(file_in_window(fname, &window("0100", "0102"), false).unwrap());
        assert!(!file_in_window(fname, &window("0101", "0102"), false).unwrap());
    }

    #[test]
    fn test_long_bursts() {
        let long = window("0050", "0130");
        assert!(!file_in_window(FILE, &long, false).unwrap());
        assert!(file_in_window(FILE, &long, true).unwrap());

        let exactly_15 = window("0055", "0110");
        assert!(file_in_window(FILE, &exactly_15, false).unwrap());
    }

    #[test]
    fn test_long_bursts_flag_is_monotone() {
        let windows = [
            window("0050", "0130"),
            window("0100", "0105"),
            window("0110", "0112"),
            window("0114", "0200"),
            window("2300", "2310"),
        ];

        let starts = ["004500", "004600", "005959", "010000", "011300", "011500"];

        for w in &windows {
            for start in starts {
                let fname = format!("KRIM_20210301_{}_01.fit.gz", start);
                let short = file_in_window(&fname, w, false).unwrap();
                let long = file_in_window(&fname, w, true).unwrap();
                assert!(!short || long, "{} {:?}", fname, w);
            }
        }
    }

    #[test]
    fn test_unparseable_is_logged() {
        let tmp = tempdir::TempDir::new("callisto-matcher").unwrap();
        let log = ErrorLog::new(tmp.path().join("ERROR_download_solar_bursts.txt"));
        let matcher = BurstMatcher::new(false, Some(log.clone()));

        assert!(!matcher.matches("KRIM_2021_xx_01.fit.gz", &window("0100", "0105")));
        assert!(!matcher.matches("GLASGOW_20210301.fit.gz", &window("0200", "0205")));

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "KRIM_2021_xx_01.fit.gz\t0100\t0105\nGLASGOW_20210301.fit.gz\t0200\t0205\n"
        );
    }

    #[test]
    fn test_segment_indices() {
        // File from 01:00 to 01:15, three 5 minute segments.
        let s = |a: &str, b: &str| segment_indices(FILE, &window(a, b), 3).unwrap();

        assert_eq!(s("0100", "0105"), set(&[0]));
        assert_eq!(s("0110", "0115"), set(&[2]));
        assert_eq!(s("0104", "0111"), set(&[0, 1, 2]));
        assert_eq!(s("0106", "0106"), set(&[1]));
        assert_eq!(s("0105", "0105"), set(&[1]));
    }

    #[test]
    fn test_segment_indices_clamped() {
        let s = |a: &str, b: &str, n| segment_indices(FILE, &window(a, b), n).unwrap();

        assert_eq!(s("0050", "0102", 5), set(&[0]));
        assert_eq!(s("0113", "0130", 5), set(&[4]));
        assert_eq!(s("0050", "0130", 3), set(&[0, 1, 2]));
        assert_eq!(s("0103", "0104", 15), set(&[3]));
        assert!(s("0120", "0125", 3).is_empty());
        assert!(s("0040", "0045", 3).is_empty());
        assert!(s("0100", "0105", 0).is_empty());
    }

    #[test]
    fn test_segment_indices_at_file_edges() {
        let s = |a: &str, b: &str| segment_indices(FILE, &window(a, b), 3).unwrap();

        // Ending exactly at the file start touches none of it.
        assert!(s("0050", "0100").is_empty());
        assert!(!file_in_window(FILE, &window("0050", "0100"), true).unwrap());

        // One minute of overlap is enough.
        assert_eq!(s("0050", "0101"), set(&[0]));

        // Zero length bursts on either edge.
        assert_eq!(s("0100", "0100"), set(&[0]));
        assert!(s("0115", "0115").is_empty());
    }
}
