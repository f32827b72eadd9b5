/*!
 * Turn burst records and date ranges into lists of archive files to fetch.
 *
 * The archive is organized by day, so all the work for one date shares a single listing request.
 */

use crate::{
    archive::{ArchiveClient, DayListing},
    catalog::BurstRecord,
    config::ArchiveConfig,
    error::FetchError,
    matcher::BurstMatcher,
};
use chrono::NaiveDate;
use log::debug;
use rustc_hash::FxHashSet as HashSet;

/// What to look for in one day's listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The catalogued bursts of that day, in catalog order.
    Bursts(Vec<BurstRecord>),
    /// Every file from one station.
    Station(String),
}

/// One unit of work: a calendar day and what to pull from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub date: NaiveDate,
    pub selection: Selection,
}

impl FetchTask {
    /// Group burst records into one task per date, dates ascending.
    pub fn from_bursts(records: &[BurstRecord]) -> Vec<FetchTask> {
        crate::catalog::unique_dates(records)
            .into_iter()
            .map(|date| FetchTask {
                date,
                selection: Selection::Bursts(
                    records.iter().filter(|r| r.date == date).cloned().collect(),
                ),
            })
            .collect()
    }

    /// One task per day in `[start, end]` for a single station.
    pub fn for_station(station: &str, start: NaiveDate, end: NaiveDate) -> Vec<FetchTask> {
        std::iter::successors(Some(start), |d| d.succ_opt())
            .take_while(|d| *d <= end)
            .map(|date| FetchTask {
                date,
                selection: Selection::Station(station.to_owned()),
            })
            .collect()
    }
}

/// A file the pipeline should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub date: NaiveDate,
    /// Name of the file in the day's directory.
    pub fname: String,
    /// The burst that selected this file, `None` in bulk mode.
    pub record: Option<BurstRecord>,
}

/// Result of planning one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayPlan {
    Files(Vec<PlannedFile>),
    /// The archive had nothing for the day.
    NoData,
}

/// Plans the downloads for each task against one archive.
pub struct FetchPlanner<'a, C: ArchiveClient> {
    client: &'a C,
    config: &'a ArchiveConfig,
    exclusion: &'a HashSet<String>,
    matcher: &'a BurstMatcher,
}

impl<'a, C: ArchiveClient> FetchPlanner<'a, C> {
    pub fn new(
        client: &'a C,
        config: &'a ArchiveConfig,
        exclusion: &'a HashSet<String>,
        matcher: &'a BurstMatcher,
    ) -> Self {
        FetchPlanner {
            client,
            config,
            exclusion,
            matcher,
        }
    }

    /// List the task's day once and pick out the wanted files.
    pub fn plan(&self, task: &FetchTask) -> Result<DayPlan, FetchError> {
        let entries = match self.client.list_day(task.date)? {
            DayListing::NoData => {
                debug!(target: "planner", "no data for {}", task.date);
                return Ok(DayPlan::NoData);
            }
            DayListing::Entries(entries) => entries,
        };

        let files = match task.selection {
            Selection::Bursts(ref records) => self.select_bursts(task.date, &entries, records),
            Selection::Station(ref station) => self.select_station(task.date, &entries, station),
        };

        debug!(target: "planner", "{}: {} of {} listed files selected", task.date, files.len(), entries.len());

        Ok(DayPlan::Files(files))
    }

    fn candidate(&self, fname: &str, prefix: &str) -> bool {
        fname.starts_with(prefix)
            && fname.ends_with(self.config.archive_suffix)
            && !self.exclusion.contains(fname)
    }

    fn select_bursts(
        &self,
        date: NaiveDate,
        entries: &[String],
        records: &[BurstRecord],
    ) -> Vec<PlannedFile> {
        let mut files = vec![];

        for record in records {
            let prefix = record.file_prefix();
            let window = record.window();

            for fname in entries {
                if self.candidate(fname, &prefix) && self.matcher.matches(fname, &window) {
                    files.push(PlannedFile {
                        date,
                        fname: fname.clone(),
                        record: Some(record.clone()),
                    });
                }
            }
        }

        files
    }

    fn select_station(&self, date: NaiveDate, entries: &[String], station: &str) -> Vec<PlannedFile> {
        let prefix = format!("{}_{}_", station, date.format("%Y%m%d"));

        entries
            .iter()
            .filter(|fname| self.candidate(fname, &prefix))
            .map(|fname| PlannedFile {
                date,
                fname: fname.clone(),
                record: None,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filename::parse_hhmm;
    use std::{cell::RefCell, path::Path};

    struct FakeArchive {
        entries: Vec<String>,
        empty_day: Option<NaiveDate>,
        listed: RefCell<Vec<NaiveDate>>,
    }

    impl ArchiveClient for FakeArchive {
        fn list_day(&self, date: NaiveDate) -> Result<DayListing, FetchError> {
            self.listed.borrow_mut().push(date);
            if Some(date) == self.empty_day {
                Ok(DayListing::NoData)
            } else {
                Ok(DayListing::Entries(self.entries.clone()))
            }
        }

        fn download(&self, _: NaiveDate, _: &str, _: &Path) -> Result<(), FetchError> {
            unreachable!()
        }
    }

    fn fake(names: &[&str]) -> FakeArchive {
        FakeArchive {
            entries: names.iter().map(|s| s.to_string()).collect(),
            empty_day: None,
            listed: RefCell::new(vec![]),
        }
    }

    fn record(station: &str, day: u32, start: &str, end: &str) -> BurstRecord {
        BurstRecord {
            station: station.to_owned(),
            date: NaiveDate::from_ymd(2021, 3, day),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
            burst_type: "III".to_owned(),
        }
    }

    const LISTING: &[&str] = &[
        "?C=N;O=D",
        "KRIM_20210301_004500_01.fit.gz",
        "KRIM_20210301_010000_01.fit.gz",
        "KRIM_20210301_011500_01.fit.gz",
        "KRIM_20210301_010000_01.txt",
        "GLASGOW_20210301_010000_01.fit.gz",
        "KRIM_2021_bad_01.fit.gz",
    ];

    fn names(plan: DayPlan) -> Vec<String> {
        match plan {
            DayPlan::Files(files) => files.into_iter().map(|f| f.fname).collect(),
            DayPlan::NoData => panic!("expected files"),
        }
    }

    #[test]
    fn test_tasks_from_bursts() {
        let records = vec![
            record("KRIM", 2, "0100", "0105"),
            record("GLASGOW", 1, "0100", "0105"),
            record("KRIM", 1, "0200", "0205"),
        ];

        let tasks = FetchTask::from_bursts(&records);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].date, NaiveDate::from_ymd(2021, 3, 1));
        assert_eq!(
            tasks[0].selection,
            Selection::Bursts(vec![records[1].clone(), records[2].clone()])
        );

        let tasks = FetchTask::for_station(
            "KRIM",
            NaiveDate::from_ymd(2020, 12, 30),
            NaiveDate::from_ymd(2021, 1, 2),
        );
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[3].date, NaiveDate::from_ymd(2021, 1, 2));
    }

    #[test]
    fn test_plan_bursts() {
        let archive = fake(LISTING);
        let config = ArchiveConfig::default();
        let exclusion = HashSet::default();
        let matcher = BurstMatcher::new(false, None);
        let planner = FetchPlanner::new(&archive, &config, &exclusion, &matcher);

        let task = FetchTask {
            date: NaiveDate::from_ymd(2021, 3, 1),
            selection: Selection::Bursts(vec![
                record("KRIM", 1, "0105", "0110"),
                record("GLASGOW", 1, "0300", "0305"),
            ]),
        };

        assert_eq!(names(planner.plan(&task).unwrap()), vec!["KRIM_20210301_010000_01.fit.gz"]);
        assert_eq!(archive.listed.borrow().len(), 1);
    }

    #[test]
    fn test_plan_uses_exclusion() {
        let archive = fake(LISTING);
        let config = ArchiveConfig::default();
        let mut exclusion = HashSet::default();
        exclusion.insert("KRIM_20210301_010000_01.fit.gz".to_owned());
        let matcher = BurstMatcher::new(true, None);
        let planner = FetchPlanner::new(&archive, &config, &exclusion, &matcher);

        let task = FetchTask {
            date: NaiveDate::from_ymd(2021, 3, 1),
            selection: Selection::Station("KRIM".to_owned()),
        };

        assert_eq!(
            names(planner.plan(&task).unwrap()),
            vec!["KRIM_20210301_004500_01.fit.gz", "KRIM_20210301_011500_01.fit.gz"]
        );
    }

    #[test]
    fn test_plan_no_data() {
        let mut archive = fake(LISTING);
        archive.empty_day = Some(NaiveDate::from_ymd(2021, 3, 1));

        let config = ArchiveConfig::default();
        let exclusion = HashSet::default();
        let matcher = BurstMatcher::new(false, None);
        let planner = FetchPlanner::new(&archive, &config, &exclusion, &matcher);

        let task = FetchTask {
            date: NaiveDate::from_ymd(2021, 3, 1),
            selection: Selection::Station("KRIM".to_owned()),
        };
        assert_eq!(planner.plan(&task).unwrap(), DayPlan::NoData);
    }
}
