/*! Parse and build archive file names.
 *
 * Observation files are named `STATION_YYYYMMDD_HHMMSS_SEQ.fit.gz`. Files this crate writes for
 * catalogued bursts add the burst type, `STATION_YYYYMMDD_HHMMSS_SEQ_TYPE.png`.
 */

use crate::{config::TWO_TOKEN_STATIONS, error::ParseError};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// The pieces of an archive file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveFileName {
    /// Station name, may contain '-' and for a few stations '_'.
    pub station: String,
    /// Start of the observation, to the second.
    pub start: NaiveDateTime,
    /// Sequence / focus code token, usually two digits.
    pub sequence: String,
    /// Burst type code appended to files written for a catalogued burst.
    pub burst_type: Option<String>,
    /// Everything from the first '.' of the last token, e.g. ".fit.gz". May be empty.
    pub extension: String,
}

impl ArchiveFileName {
    /// Split a file name into its parts.
    ///
    /// Any leading directories are ignored.
    pub fn parse(fname: &str) -> Result<Self, ParseError> {
        let base = fname.rsplit('/').next().unwrap_or(fname);

        let (body, extension) = match base.find('.') {
            Some(idx) => base.split_at(idx),
            None => (base, ""),
        };

        let tokens: Vec<&str> = body.split('_').collect();

        let (station, rest) = match TWO_TOKEN_STATIONS
            .iter()
            .find(|(first, second)| tokens.len() > 1 && tokens[0] == *first && tokens[1] == *second)
        {
            Some(_) => (format!("{}_{}", tokens[0], tokens[1]), &tokens[2..]),
            None => (tokens[0].to_owned(), &tokens[1..]),
        };

        if station.is_empty() {
            return Err(ParseError::new("missing station", fname));
        }

        if rest.len() < 3 || rest.len() > 4 {
            return Err(ParseError::new("wrong number of fields in file name", fname));
        }

        let date = parse_date(rest[0]).ok_or_else(|| ParseError::new("invalid date", fname))?;
        let time = parse_time(rest[1]).ok_or_else(|| ParseError::new("invalid time", fname))?;

        let sequence = rest[2].to_owned();
        if sequence.is_empty() {
            return Err(ParseError::new("missing sequence number", fname));
        }

        let burst_type = match rest.get(3) {
            Some(tp) if tp.is_empty() => {
                return Err(ParseError::new("empty burst type", fname));
            }
            Some(tp) => Some((*tp).to_owned()),
            None => None,
        };

        Ok(ArchiveFileName {
            station,
            start: NaiveDateTime::new(date, time),
            sequence,
            burst_type,
            extension: extension.to_owned(),
        })
    }

    /// Build the file name back up.
    pub fn render(&self) -> String {
        let suffix = match self.burst_type {
            Some(ref tp) => format!("_{}{}", tp, self.extension),
            None => self.extension.clone(),
        };

        render(&self.station, &self.start, &self.sequence, &suffix)
    }

    /// The same file, but starting `seconds` later.
    pub fn shifted(&self, seconds: i64) -> Self {
        ArchiveFileName {
            start: self.start + Duration::seconds(seconds),
            ..self.clone()
        }
    }

    /// Replace the extension, e.g. to go from ".fit.gz" to ".png".
    pub fn with_extension(&self, extension: &str) -> Self {
        ArchiveFileName {
            extension: extension.to_owned(),
            ..self.clone()
        }
    }

    /// The name of the compressed archive file this one was derived from.
    pub fn source_name(&self) -> String {
        render(&self.station, &self.start, &self.sequence, ".fit.gz")
    }

    /// Name without the extension.
    pub fn stem(&self) -> String {
        self.with_extension("").render()
    }
}

/// Build a file name with every numeric field zero padded to its fixed width.
///
/// The suffix is appended verbatim, so it should carry its own '_' or '.'.
pub fn render(station: &str, timestamp: &NaiveDateTime, sequence: &str, suffix: &str) -> String {
    format!(
        "{}_{}_{}_{}{}",
        station,
        timestamp.format("%Y%m%d"),
        timestamp.format("%H%M%S"),
        sequence,
        suffix
    )
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a `YYYYMMDD` string.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 8 || !all_digits(s) {
        return None;
    }

    let year: i32 = s[..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a `HHMMSS` string.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    if s.len() != 6 || !all_digits(s) {
        return None;
    }

    let hour: u32 = s[..2].parse().ok()?;
    let minute: u32 = s[2..4].parse().ok()?;
    let second: u32 = s[4..].parse().ok()?;

    NaiveTime::from_hms_opt(hour, minute, second)
}

/// Parse a `HHMM` string.
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    if s.len() != 4 || !all_digits(s) {
        return None;
    }

    let hour: u32 = s[..2].parse().ok()?;
    let minute: u32 = s[2..].parse().ok()?;

    NaiveTime::from_hms_opt(hour, minute, 0)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd(y, mo, d).and_hms(h, mi, s)
    }

    #[test]
    fn test_parse_archive_name() {
        let f = ArchiveFileName::parse("ALASKA-HAARP_20210301_010000_01.fit.gz").unwrap();
        assert_eq!(f.station, "ALASKA-HAARP");
        assert_eq!(f.start, ts(2021, 3, 1, 1, 0, 0));
        assert_eq!(f.sequence, "01");
        assert_eq!(f.burst_type, None);
        assert_eq!(f.extension, ".fit.gz");
    }

    #[test]
    fn test_parse_with_burst_type_and_dirs() {
        let f = ArchiveFileName::parse("out/pngs/Australia-ASSA_20210922_224506_01_VI.png").unwrap();
        assert_eq!(f.station, "Australia-ASSA");
        assert_eq!(f.start, ts(2021, 9, 22, 22, 45, 6));
        assert_eq!(f.burst_type.as_deref(), Some("VI"));
        assert_eq!(f.extension, ".png");
        assert_eq!(f.source_name(), "Australia-ASSA_20210922_224506_01.fit.gz");
    }

    #[test]
    fn test_parse_two_token_station() {
        let f = ArchiveFileName::parse("Malaysia_Banting_20200101_120000_59.fit.gz").unwrap();
        assert_eq!(f.station, "Malaysia_Banting");
        assert_eq!(f.start, ts(2020, 1, 1, 12, 0, 0));
        assert_eq!(f.sequence, "59");
    }

    #[test]
    fn test_parse_failures() {
        assert!(ArchiveFileName::parse("GLASGOW_2021030_010000_01.fit.gz").is_err());
        assert!(ArchiveFileName::parse("GLASGOW_2021O301_010000_01.fit.gz").is_err());
        assert!(ArchiveFileName::parse("GLASGOW_20210301_0100_01.fit.gz").is_err());
        assert!(ArchiveFileName::parse("GLASGOW_20210301_250000_01.fit.gz").is_err());
        assert!(ArchiveFileName::parse("GLASGOW_20210231_010000_01.fit.gz").is_err());
        assert!(ArchiveFileName::parse("GLASGOW_20210301.fit.gz").is_err());
        assert!(ArchiveFileName::parse("../").is_err());
        assert!(ArchiveFileName::parse("").is_err());
    }

    #[test]
    fn test_round_trip() {
        let names = [
            "ALASKA-HAARP_20210301_010000_01.fit.gz",
            "Australia-ASSA_20210922_224506_01_VI.png",
            "Malaysia_Banting_20200101_000009_59_III-U.npy",
            "GLASGOW_19991231_235959_02",
        ];

        for name in names {
            let parsed = ArchiveFileName::parse(name).unwrap();
            assert_eq!(parsed.render(), name);
            assert_eq!(ArchiveFileName::parse(&parsed.render()).unwrap(), parsed);
        }

        for (station, t, seq) in [
            ("KRIM", ts(2001, 2, 3, 4, 5, 6), "01"),
            ("NORWAY-NY-AALESUND", ts(2022, 12, 31, 23, 59, 59), "62"),
            ("Malaysia_Banting", ts(2015, 7, 9, 0, 0, 0), "59"),
        ] {
            let name = render(station, &t, seq, ".fit.gz");
            let parsed = ArchiveFileName::parse(&name).unwrap();
            assert_eq!(parsed.station, station);
            assert_eq!(parsed.start, t);
            assert_eq!(parsed.sequence, seq);
        }
    }

    #[test]
    fn test_shifted() {
        let f = ArchiveFileName::parse("Australia-ASSA_20210922_235006_01_VI.png").unwrap();
        assert_eq!(
            f.shifted(10 * 60).render(),
            "Australia-ASSA_20210923_000006_01_VI.png"
        );
        assert_eq!(f.shifted(0), f);
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("0108"), NaiveTime::from_hms_opt(1, 8, 0));
        assert_eq!(parse_hhmm("2360"), None);
        assert_eq!(parse_hhmm("108"), None);
        assert_eq!(parse_hhmm("01:8"), None);
    }
}
