//! Documentation for the binary is with the definition of `StationDownloadOptionsInit` below.

use callisto::{
    burst_output_dir, parse_date, station_output_dir, validate_station, ArchiveConfig,
    BatchDriver, BurstCatalog, BurstMatcher, CallistoResult, FetchTask, HttpArchive, OutputFormat,
    OutputSink, Pipeline, RowNormalization, DEFAULT_ARCHIVE_URL,
};
use chrono::{Datelike, NaiveDate};
use clap::Parser;
use log::{debug, info, LevelFilter};
use rustc_hash::FxHashSet as HashSet;
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Download every observation from one station over a range of days.
///
/// Files are written under DATA_DIR/Instruments/. If a burst catalog is given, files known to
/// hold a solar burst are left out and the output directory is tagged NSB (no solar bursts),
/// otherwise it is tagged WSB (with solar bursts).
///
#[derive(Debug, Parser)]
#[clap(bin_name = "stationdn")]
#[clap(author, version, about)]
struct StationDownloadOptionsInit {
    /// Station name as it appears in the archive file names, e.g. ALASKA-HAARP.
    #[clap(parse(try_from_str=validate_station))]
    station: String,

    /// First day to download, YYYYMMDD.
    #[clap(parse(try_from_str=parse_day))]
    start: NaiveDate,

    /// Last day to download, YYYYMMDD. Defaults to the end of the year of the first day.
    #[clap(parse(try_from_str=parse_day))]
    end: Option<NaiveDate>,

    /// Root directory for the output.
    ///
    /// If this is not specified, then the program will check for it in the "CALLISTO_DATA"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CALLISTO_DATA")]
    data_dir: PathBuf,

    /// Burst catalog whose burst files should be left out of the download.
    #[clap(short = 'x', long)]
    exclude_catalog: Option<PathBuf>,

    /// Directory of burst images used to fill an empty burst file table in the catalog.
    ///
    /// Defaults to the png output directory of burstdn with no splits.
    #[clap(short, long)]
    burst_dir: Option<PathBuf>,

    /// Root URL of the archive.
    #[clap(long)]
    #[clap(env = "CALLISTO_ARCHIVE_URL")]
    #[clap(default_value = DEFAULT_ARCHIVE_URL)]
    archive_url: String,

    /// Output format, one of gz, fit, npy, or png.
    #[clap(short, long)]
    #[clap(default_value = "png")]
    format: OutputFormat,

    /// Split each png in time into this many pieces. Allowed values are 0, 3, 5, and 15.
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_splits))]
    #[clap(default_value_t = 0)]
    splits: usize,

    /// Number of download threads, defaults to the number of CPUs.
    #[clap(short, long)]
    workers: Option<usize>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn parse_day(day: &str) -> Result<NaiveDate, String> {
    parse_date(day).ok_or_else(|| format!("invalid date, expected YYYYMMDD: {}", day))
}

fn parse_splits(splits: &str) -> Result<usize, String> {
    let splits: usize = splits
        .parse()
        .map_err(|_| format!("not a number: {}", splits))?;
    ArchiveConfig::default().validate_splits(splits)
}

#[derive(Debug)]
struct StationDownloadOptionsChecked {
    station: String,
    start: NaiveDate,
    end: NaiveDate,
    data_dir: PathBuf,
    exclude_catalog: Option<PathBuf>,
    burst_dir: PathBuf,
    config: ArchiveConfig,
    format: OutputFormat,
    splits: usize,
    workers: Option<usize>,
}

impl Display for StationDownloadOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f)?;
        writeln!(f, "     Station: {}", self.station)?;
        writeln!(f, "       Dates: {} - {}", self.start, self.end)?;
        writeln!(f, "        Data: {}", self.data_dir.display())?;
        writeln!(f, "     Archive: {}", self.config.base_url)?;
        writeln!(f, "      Format: {}", self.format.name())?;
        writeln!(f, "      Splits: {}", self.splits)?;
        if let Some(ref cat) = self.exclude_catalog {
            writeln!(f, "   Excluding: {}", cat.display())?;
        }
        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> CallistoResult<StationDownloadOptionsChecked> {
    let StationDownloadOptionsInit {
        station,
        start,
        end,
        data_dir,
        exclude_catalog,
        burst_dir,
        archive_url,
        format,
        splits,
        workers,
        verbose,
    } = StationDownloadOptionsInit::parse();

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    let end = match end {
        Some(end) => end,
        None => NaiveDate::from_ymd_opt(start.year(), 12, 31).ok_or("invalid year")?,
    };

    if end < start {
        return Err(format!("end date {} is before start date {}", end, start).into());
    }

    let burst_dir =
        burst_dir.unwrap_or_else(|| burst_output_dir(&data_dir, OutputFormat::Png, 0, false));
    let splits = if format == OutputFormat::Png { splits } else { 0 };

    let checked = StationDownloadOptionsChecked {
        station,
        start,
        end,
        data_dir,
        exclude_catalog,
        burst_dir,
        config: ArchiveConfig::with_base_url(&archive_url),
        format,
        splits,
        workers,
    };

    info!(target: "startup", "{}", checked);

    Ok(checked)
}

/// Names of this station's archive files known to hold bursts.
fn load_exclusion(opts: &StationDownloadOptionsChecked) -> CallistoResult<HashSet<String>> {
    let path = match opts.exclude_catalog {
        Some(ref path) => path,
        None => return Ok(HashSet::default()),
    };

    let mut catalog = BurstCatalog::open_existing(path)?;
    catalog.seed_burst_files_from_dir(&opts.burst_dir)?;

    catalog.burst_files(Some(&opts.station))
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> CallistoResult<()> {
    let opts = parse_args()?;

    let exclusion = load_exclusion(&opts)?;
    info!(target: "stationdn", "excluding {} burst files", exclusion.len());

    let out_dir = station_output_dir(&opts.data_dir, &opts.station, opts.splits, !exclusion.is_empty());
    let tasks = FetchTask::for_station(&opts.station, opts.start, opts.end);

    let sink = OutputSink::new(opts.format, RowNormalization::None);
    let pipeline = Pipeline::new(opts.config.clone(), sink, opts.splits, &out_dir);

    let client = HttpArchive::new(opts.config.clone())?;
    let matcher = BurstMatcher::new(true, None);
    let mut driver = BatchDriver::new(client, opts.config.clone(), exclusion, matcher);
    if let Some(n) = opts.workers {
        driver = driver.with_workers(n);
    }
    debug!(target: "stationdn", "using {} workers for {} days", driver.num_workers(), tasks.len());

    let summary = driver.run(&tasks, &pipeline)?;

    info!(
        target: "summary",
        "{}: {} files converted, {} already present, {} failed, {} days without data in {:.0}s",
        out_dir.display(),
        summary.written,
        summary.skipped,
        summary.failed,
        summary.dates_without_data,
        summary.elapsed.as_secs_f64()
    );

    Ok(())
}
