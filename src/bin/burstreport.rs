//! Documentation for the binary is with the definition of `BurstReportOptionsInit` below.

use callisto::{
    detection::{overlay_boxes, parse_predictions, write_image_list, write_report, ReportFile},
    CallistoResult,
};
use clap::Parser;
use log::{debug, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

/*-------------------------------------------------------------------------------------------------
 *                               Parse Command Line Arguments
 *-----------------------------------------------------------------------------------------------*/
///
/// Turn burst detector output into a burst report.
///
/// With --list-images, only write the list of PNG files in IMAGE_DIR for the detector to read.
///
#[derive(Debug, Parser)]
#[clap(bin_name = "burstreport")]
#[clap(author, version, about)]
struct BurstReportOptionsInit {
    /// Directory holding the images given to the detector.
    image_dir: PathBuf,

    /// Detector output file. Written to instead of read with --list-images.
    predictions: PathBuf,

    /// Write the image list and exit.
    #[clap(long)]
    list_images: bool,

    /// Where to write the report. Defaults to report.txt next to the predictions file.
    #[clap(short, long)]
    report: Option<PathBuf>,

    /// Width of the images as the detector saw them, which may differ from the files on disk.
    #[clap(short, long)]
    #[clap(default_value_t = 496)]
    width: u32,

    /// Write a copy of each image with its detections outlined into this directory.
    #[clap(short, long)]
    boxes_dir: Option<PathBuf>,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

/*-------------------------------------------------------------------------------------------------
 *                                            Main
 *-----------------------------------------------------------------------------------------------*/
fn main() -> CallistoResult<()> {
    let opts = BurstReportOptionsInit::parse();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    debug!(target: "startup", "{:#?}", opts);

    if opts.list_images {
        let n = write_image_list(&opts.image_dir, &opts.predictions)?;
        info!(target: "summary", "listed {} images in {}", n, opts.predictions.display());
        return Ok(());
    }

    let text = std::fs::read_to_string(&opts.predictions)?;
    let prefix = opts.image_dir.to_string_lossy();
    let images = parse_predictions(&text, &prefix);
    info!(target: "burstreport", "{} images with detections", images.len());

    let mut bursts = vec![];
    for img in &images {
        match img.burst_intervals(opts.width) {
            Ok(found) => bursts.extend(found),
            Err(err) => warn!(target: "burstreport", "skipping {}: {}", img.path.display(), err),
        }
    }

    let report_path = match opts.report {
        Some(ref path) => path.clone(),
        None => opts.predictions.with_file_name("report.txt"),
    };

    let mut report = ReportFile::new(&report_path)?;
    let rows = write_report(&mut report, &bursts)?;
    info!(target: "summary", "{} report rows in {}", rows, report_path.display());

    if let Some(ref boxes_dir) = opts.boxes_dir {
        std::fs::create_dir_all(boxes_dir)?;

        for img in &images {
            let fname = img.file_name();
            let src = opts.image_dir.join(&fname);
            if let Err(err) = overlay_boxes(&src, boxes_dir.join(&fname), &img.boxes) {
                warn!(target: "burstreport", "unable to draw boxes on {}: {}", src.display(), err);
            }
        }
    }

    Ok(())
}
