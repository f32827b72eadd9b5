//! Documentation for the binary is with the definition of `BurstDownloadOptionsInit` below.

use callisto::{
    burst_output_dir, exclusion_from_dir, ArchiveConfig, BatchDriver, BurstCatalog, BurstMatcher,
    CallistoResult, ErrorLog, FetchTask, HttpArchive, OutputFormat, OutputSink, Pipeline,
    RowNormalization, DEFAULT_ARCHIVE_URL,
};
use clap::Parser;
use log::{debug, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::{
    fmt::{self, Display},
    path::PathBuf,
};

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Download the observations that hold a catalogued solar burst.
///
/// Files are written under DATA_DIR/Solar_bursts_files/ in a directory named for the output
/// format, the number of splits, and whether long bursts were included. Files that are already
/// there are not downloaded again.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "burstdn")]
#[clap(author, version, about)]
struct BurstDownloadOptionsInit {
    /// The path to the burst catalog file, as built by burstlist.
    ///
    /// If this is not specified, then the program will check for it in the "CALLISTO_CATALOG"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CALLISTO_CATALOG")]
    catalog: PathBuf,

    /// Root directory for the output.
    ///
    /// If this is not specified, then the program will check for it in the "CALLISTO_DATA"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CALLISTO_DATA")]
    data_dir: PathBuf,

    /// Root URL of the archive.
    #[clap(long)]
    #[clap(env = "CALLISTO_ARCHIVE_URL")]
    #[clap(default_value = DEFAULT_ARCHIVE_URL)]
    archive_url: String,

    /// Output format, one of gz, fit, npy, or png.
    #[clap(short, long)]
    #[clap(default_value = "png")]
    format: OutputFormat,

    /// Split each image in time into this many pieces, keeping only the pieces with the burst.
    ///
    /// Only used for png output. Allowed values are 0 (no splitting), 3, 5, and 15.
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_splits))]
    #[clap(default_value_t = 0)]
    splits: usize,

    /// Include bursts reported as lasting longer than one 15 minute observation.
    #[clap(short = 'l', long)]
    include_long_bursts: bool,

    /// Remove the background from each frequency channel before rendering.
    ///
    /// One of none, mean (subtract the mean), or std (subtract the mean and divide by the
    /// standard deviation).
    #[clap(short, long)]
    #[clap(parse(try_from_str=parse_normalization))]
    #[clap(default_value = "none")]
    normalize: RowNormalization,

    /// Number of download threads, defaults to the number of CPUs.
    #[clap(short, long)]
    workers: Option<usize>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn parse_splits(splits: &str) -> Result<usize, String> {
    let splits: usize = splits
        .parse()
        .map_err(|_| format!("not a number: {}", splits))?;
    ArchiveConfig::default().validate_splits(splits)
}

fn parse_normalization(how: &str) -> Result<RowNormalization, String> {
    match how {
        "none" => Ok(RowNormalization::None),
        "mean" => Ok(RowNormalization::SubtractMean),
        "std" => Ok(RowNormalization::Standardize),
        _ => Err(format!("unknown normalization: {}", how)),
    }
}

#[derive(Debug)]
struct BurstDownloadOptionsChecked {
    catalog: PathBuf,
    out_dir: PathBuf,
    error_log: PathBuf,
    config: ArchiveConfig,
    format: OutputFormat,
    splits: usize,
    include_long_bursts: bool,
    normalize: RowNormalization,
    workers: Option<usize>,
}

impl Display for BurstDownloadOptionsChecked {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        writeln!(f)?;
        writeln!(f, "     Catalog: {}", self.catalog.display())?;
        writeln!(f, "      Output: {}", self.out_dir.display())?;
        writeln!(f, "     Archive: {}", self.config.base_url)?;
        writeln!(f, "      Format: {}", self.format.name())?;
        writeln!(f, "      Splits: {}", self.splits)?;
        writeln!(f, " Long bursts: {}", self.include_long_bursts)?;
        writeln!(f, "   Error log: {}", self.error_log.display())?;
        Ok(())
    }
}

/// Get the command line arguments and check them.
///
/// If there is missing data, try to fill it in with environment variables.
fn parse_args() -> CallistoResult<BurstDownloadOptionsChecked> {
    let BurstDownloadOptionsInit {
        catalog,
        data_dir,
        archive_url,
        format,
        splits,
        include_long_bursts,
        normalize,
        workers,
        verbose,
    } = BurstDownloadOptionsInit::parse();

    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    // Splitting only applies to images.
    let splits = if format == OutputFormat::Png { splits } else { 0 };

    let checked = BurstDownloadOptionsChecked {
        catalog,
        out_dir: burst_output_dir(&data_dir, format, splits, include_long_bursts),
        error_log: data_dir.join("ERROR_download_solar_bursts.txt"),
        config: ArchiveConfig::with_base_url(&archive_url),
        format,
        splits,
        include_long_bursts,
        normalize,
        workers,
    };

    info!(target: "startup", "{}", checked);

    Ok(checked)
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> CallistoResult<()> {
    let opts = parse_args()?;

    let records = BurstCatalog::open_existing(&opts.catalog)?.bursts()?;
    let tasks = FetchTask::from_bursts(&records);
    info!(target: "burstdn", "{} bursts on {} dates", records.len(), tasks.len());

    if let Some(parent) = opts.error_log.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let matcher = BurstMatcher::new(opts.include_long_bursts, Some(ErrorLog::new(&opts.error_log)));

    let sink = OutputSink::new(opts.format, opts.normalize);
    let pipeline = Pipeline::new(opts.config.clone(), sink, opts.splits, &opts.out_dir);

    // Split images are named for their segment, so only whole images map back to an archive file.
    let exclusion = if opts.splits == 0 {
        exclusion_from_dir(&opts.out_dir)?
    } else {
        Default::default()
    };
    info!(target: "burstdn", "{} files already downloaded", exclusion.len());

    let client = HttpArchive::new(opts.config.clone())?;
    let mut driver = BatchDriver::new(client, opts.config.clone(), exclusion, matcher);
    if let Some(n) = opts.workers {
        driver = driver.with_workers(n);
    }
    debug!(target: "burstdn", "using {} workers", driver.num_workers());

    let summary = driver.run(&tasks, &pipeline)?;

    info!(
        target: "summary",
        "{} files converted, {} already present, {} failed in {:.0}s",
        summary.written,
        summary.skipped,
        summary.failed,
        summary.elapsed.as_secs_f64()
    );

    Ok(())
}
