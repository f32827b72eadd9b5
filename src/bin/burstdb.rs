use callisto::{
    ArchiveConfig, BatchDriver, BurstCatalog, BurstMatcher, CallistoResult, FetchTask,
    HttpArchive, DEFAULT_ARCHIVE_URL,
};
use clap::Parser;
use log::{debug, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Record which archive files hold a catalogued burst, without downloading them.
///
/// The names are stored in the catalog's burst file table, where stationdn uses them to leave
/// burst observations out of a bulk download.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "burstdb")]
#[clap(author, version, about)]
struct BurstDbOptionsInit {
    /// The path to the burst catalog file, as built by burstlist.
    ///
    /// If this is not specified, then the program will check for it in the "CALLISTO_CATALOG"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CALLISTO_CATALOG")]
    catalog: PathBuf,

    /// Directory for the per-worker partial catalogs. Defaults to the catalog's directory.
    #[clap(long)]
    scratch_dir: Option<PathBuf>,

    /// Root URL of the archive.
    #[clap(long)]
    #[clap(env = "CALLISTO_ARCHIVE_URL")]
    #[clap(default_value = DEFAULT_ARCHIVE_URL)]
    archive_url: String,

    /// Include bursts reported as lasting longer than one 15 minute observation.
    #[clap(short = 'l', long)]
    include_long_bursts: bool,

    /// Number of threads, defaults to the number of CPUs.
    #[clap(short, long)]
    workers: Option<usize>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> CallistoResult<()> {
    let opts = BurstDbOptionsInit::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    debug!(target: "startup", "{:#?}", opts);

    let scratch_dir = match opts.scratch_dir {
        Some(ref dir) => dir.clone(),
        None => opts
            .catalog
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let records = BurstCatalog::open_existing(&opts.catalog)?.bursts()?;
    let tasks = FetchTask::from_bursts(&records);
    info!(target: "burstdb", "{} bursts on {} dates", records.len(), tasks.len());

    let config = ArchiveConfig::with_base_url(&opts.archive_url);
    let client = HttpArchive::new(config.clone())?;
    let matcher = BurstMatcher::new(opts.include_long_bursts, None);

    let mut driver = BatchDriver::new(client, config, Default::default(), matcher);
    if let Some(n) = opts.workers {
        driver = driver.with_workers(n);
    }

    let added = driver.update_catalog(&tasks, &opts.catalog, &scratch_dir)?;

    info!(target: "summary", "{} new burst files in {}", added, opts.catalog.display());

    Ok(())
}
