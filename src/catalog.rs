/*!
 * The burst catalog.
 *
 * Parsed burst reports and the names of archive files known to hold bursts are kept in a small
 * sqlite database so they can be reused between runs.
 */

pub mod report;

use crate::{
    filename::{parse_date, parse_hhmm, ArchiveFileName},
    matcher::BurstWindow,
    CallistoResult,
};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};
use rusqlite::{Connection, OpenFlags, ToSql};
use rustc_hash::FxHashSet as HashSet;
use std::path::Path;

/// One reported burst as seen by one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstRecord {
    pub station: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Type code, already cleaned of characters that can't go in a file name.
    pub burst_type: String,
}

impl BurstRecord {
    pub fn date_str(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn start_hhmm(&self) -> String {
        self.start.format("%H%M").to_string()
    }

    pub fn end_hhmm(&self) -> String {
        self.end.format("%H%M").to_string()
    }

    pub fn window(&self) -> BurstWindow {
        BurstWindow::new(self.start, self.end)
    }

    /// Prefix shared by all archive files from this station on this date.
    pub fn file_prefix(&self) -> String {
        format!("{}_{}_", self.station, self.date_str())
    }
}

/// The distinct dates of a set of records, in ascending order.
pub fn unique_dates(records: &[BurstRecord]) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Connection to the catalog database.
pub struct BurstCatalog {
    conn: Connection,
}

impl BurstCatalog {
    /// Open a catalog, creating it if needed.
    pub fn connect<P: AsRef<Path>>(path: P) -> CallistoResult<Self> {
        let path = path.as_ref();

        let conn = Self::open_database(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(BurstCatalog { conn })
    }

    /// Open an existing catalog. Fails if the file isn't there.
    pub fn open_existing<P: AsRef<Path>>(path: P) -> CallistoResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(format!("catalog not found: {}", path.display()).into());
        }

        let conn = Self::open_database(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(BurstCatalog { conn })
    }

    fn open_database(path: &Path, flags: OpenFlags) -> CallistoResult<Connection> {
        let conn = rusqlite::Connection::open_with_flags(path, flags)?;

        // Several workers may write partial catalogs at once, but never the same file.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        const QUERY: &str = include_str!("catalog/create_catalog.sql");
        conn.execute_batch(QUERY)?;

        Ok(conn)
    }

    /// Replace the whole burst table.
    pub fn replace_bursts(&mut self, records: &[BurstRecord]) -> CallistoResult<()> {
        const ADD_QUERY: &str = include_str!("catalog/add_burst.sql");

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM bursts", [])?;
        {
            let mut stmt = tx.prepare(ADD_QUERY)?;
            for rec in records {
                stmt.execute([
                    &rec.station as &dyn ToSql,
                    &rec.date_str(),
                    &rec.start_hhmm(),
                    &rec.end_hhmm(),
                    &rec.burst_type,
                ])?;
            }
        }
        tx.commit()?;

        info!(target: "catalog", "stored {} burst records", records.len());

        Ok(())
    }

    /// All the burst records, in the order they were stored.
    pub fn bursts(&self) -> CallistoResult<Vec<BurstRecord>> {
        const QUERY: &str = include_str!("catalog/query_bursts.sql");
        let mut stmt = self.conn.prepare(QUERY)?;

        let records = stmt
            .query_and_then([], |row| -> CallistoResult<BurstRecord> {
                let station: String = row.get(0)?;
                let date: String = row.get(1)?;
                let start: String = row.get(2)?;
                let end: String = row.get(3)?;
                let burst_type: String = row.get(4)?;

                let date = parse_date(&date).ok_or("invalid date in catalog")?;
                let start = parse_hhmm(&start).ok_or("invalid start time in catalog")?;
                let end = parse_hhmm(&end).ok_or("invalid end time in catalog")?;

                Ok(BurstRecord {
                    station,
                    date,
                    start,
                    end,
                    burst_type,
                })
            })?
            .collect::<CallistoResult<Vec<BurstRecord>>>()?;

        Ok(records)
    }

    /// Add names of archive files known to hold bursts.
    pub fn add_burst_files<I, S>(&mut self, names: I) -> CallistoResult<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        const ADD_QUERY: &str = include_str!("catalog/add_burst_file.sql");

        let tx = self.conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare(ADD_QUERY)?;
            for name in names {
                added += stmt.execute([name.as_ref()])?;
            }
        }
        tx.commit()?;

        Ok(added)
    }

    /// Names of archive files known to hold bursts, optionally only for one station.
    pub fn burst_files(&self, station: Option<&str>) -> CallistoResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT solar_bursts_file_names FROM burst_files")?;

        let mut names = HashSet::default();
        for name in stmt.query_map([], |row| row.get::<_, String>(0))? {
            let name = name?;
            let keep = match station {
                Some(st) => name.contains(st),
                None => true,
            };
            if keep {
                names.insert(name);
            }
        }

        Ok(names)
    }

    /// Number of names in the burst file table.
    pub fn num_burst_files(&self) -> CallistoResult<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM burst_files", [], |row| row.get(0))?;
        Ok(usize::try_from(n)?)
    }

    /// Fill an empty burst file table from a directory of burst images.
    ///
    /// Does nothing if the table already has entries or the directory doesn't exist.
    pub fn seed_burst_files_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> CallistoResult<usize> {
        let dir = dir.as_ref();
        if self.num_burst_files()? > 0 || !dir.is_dir() {
            return Ok(0);
        }

        let names = exclusion_from_dir(dir)?;
        let added = self.add_burst_files(names.iter())?;
        info!(target: "catalog", "seeded {} burst files from {}", added, dir.display());

        Ok(added)
    }
}

/// Map every file in an output directory back to the archive file it came from.
///
/// Files whose names don't parse are ignored.
pub fn exclusion_from_dir<P: AsRef<Path>>(dir: P) -> CallistoResult<HashSet<String>> {
    let dir = dir.as_ref();
    let mut names = HashSet::default();

    if !dir.is_dir() {
        return Ok(names);
    }

    for entry in walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|res| res.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let fname = entry.file_name().to_string_lossy();
        match ArchiveFileName::parse(&fname) {
            Ok(parsed) => {
                names.insert(parsed.source_name());
            }
            Err(err) => debug!(target: "catalog", "ignoring {}: {}", fname, err),
        }
    }

    Ok(names)
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn record(station: &str, day: u32, start: &str, end: &str) -> BurstRecord {
        BurstRecord {
            station: station.to_owned(),
            date: NaiveDate::from_ymd(2021, 3, day),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
            burst_type: "III".to_owned(),
        }
    }

    #[test]
    fn test_bursts_round_trip() {
        let tmp = TempDir::new("callisto-catalog").unwrap();
        let path = tmp.path().join("catalog.sqlite");

        let records = vec![
            record("ALASKA-HAARP", 1, "0108", "0108"),
            record("KRIM", 2, "2350", "2359"),
            record("ALASKA-HAARP", 1, "0300", "0315"),
        ];

        {
            let mut cat = BurstCatalog::connect(&path).unwrap();
            cat.replace_bursts(&records).unwrap();
        }

        let cat = BurstCatalog::open_existing(&path).unwrap();
        assert_eq!(cat.bursts().unwrap(), records);

        let mut cat = cat;
        cat.replace_bursts(&records[..1]).unwrap();
        assert_eq!(cat.bursts().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_catalog_is_an_error() {
        let tmp = TempDir::new("callisto-catalog").unwrap();
        assert!(BurstCatalog::open_existing(tmp.path().join("nope.sqlite")).is_err());
    }

    #[test]
    fn test_burst_files() {
        let tmp = TempDir::new("callisto-catalog").unwrap();
        let mut cat = BurstCatalog::connect(tmp.path().join("catalog.sqlite")).unwrap();

        let added = cat
            .add_burst_files(&[
                "KRIM_20210301_010000_01.fit.gz",
                "GLASGOW_20210301_010000_01.fit.gz",
                "KRIM_20210301_010000_01.fit.gz",
            ])
            .unwrap();
        assert_eq!(added, 2);

        assert_eq!(cat.burst_files(None).unwrap().len(), 2);
        let krim = cat.burst_files(Some("KRIM")).unwrap();
        assert_eq!(krim.len(), 1);
        assert!(krim.contains("KRIM_20210301_010000_01.fit.gz"));
    }

    #[test]
    fn test_unique_dates() {
        let records = vec![
            record("A", 3, "0100", "0101"),
            record("B", 1, "0100", "0101"),
            record("C", 3, "0100", "0101"),
        ];
        assert_eq!(
            unique_dates(&records),
            vec![NaiveDate::from_ymd(2021, 3, 1), NaiveDate::from_ymd(2021, 3, 3)]
        );
    }

    #[test]
    fn test_exclusion_from_dir() {
        let tmp = TempDir::new("callisto-exclusion").unwrap();
        for name in [
            "KRIM_20210301_010000_01_III.png",
            "KRIM_20210301_010500_01_III.png",
            "notes.txt",
        ] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }

        let names = exclusion_from_dir(tmp.path()).unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("KRIM_20210301_010000_01.fit.gz"));
        assert!(names.contains("KRIM_20210301_010500_01.fit.gz"));

        let mut cat = BurstCatalog::connect(tmp.path().join("catalog.sqlite")).unwrap();
        assert_eq!(cat.seed_burst_files_from_dir(tmp.path()).unwrap(), 2);
        assert_eq!(cat.seed_burst_files_from_dir(tmp.path()).unwrap(), 0);
    }
}
