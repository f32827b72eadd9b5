use callisto::{catalog::report::read_reports, BurstCatalog, CallistoResult};
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Load published burst lists into the burst catalog.
///
/// Every record already in the catalog is replaced by the contents of the lists given.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "burstlist")]
#[clap(author, version, about)]
struct BurstListOptionsInit {
    /// The path to the burst catalog file. It is created if it doesn't exist.
    ///
    /// If this is not specified, then the program will check for it in the "CALLISTO_CATALOG"
    /// environment variable.
    #[clap(short, long)]
    #[clap(env = "CALLISTO_CATALOG")]
    catalog: PathBuf,

    /// Burst list text files, as published by the e-Callisto network.
    #[clap(required = true)]
    reports: Vec<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> CallistoResult<()> {
    let opts = BurstListOptionsInit::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    debug!(target: "startup", "{:#?}", opts);

    let records = read_reports(&opts.reports).map_err(|err| {
        error!(target: "burstlist", "{}, leaving the catalog unchanged", err);
        err
    })?;

    let mut catalog = BurstCatalog::connect(&opts.catalog)?;
    catalog.replace_bursts(&records)?;

    info!(
        target: "summary",
        "{} burst records on {} dates",
        records.len(),
        callisto::unique_dates(&records).len()
    );

    Ok(())
}
