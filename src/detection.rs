/*!
 * Consume the output of an external burst detector.
 *
 * The detector is run by hand on a list of rendered PNGs (see [`write_image_list`]). Its output
 * names each image followed by one line per detected burst:
 *
 * ```text
 * /data/pngs/ALASKA-ANCHORAGE_20220331_183024_01_IV.png: Predicted in 12.1 milli-seconds.
 * Burst: 24%	(left_x:  148   top_y:  -25   width:   37   height:  351)
 * ```
 *
 * Boxes are turned back into burst times using the observation window of the image, and written
 * as a report in the same column layout as the published burst lists.
 */

use crate::{error::ParseError, filename::ArchiveFileName, matcher::OBSERVATION_MINUTES, CallistoResult};
use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use image::Rgb;
use log::debug;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// One box found by the detector, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionBox {
    /// Percent.
    pub confidence: i32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl DetectionBox {
    fn parse(line: &str) -> Option<Self> {
        let confidence = line
            .strip_prefix("Burst:")?
            .trim_start()
            .split('%')
            .next()?
            .trim()
            .parse()
            .ok()?;

        Some(DetectionBox {
            confidence,
            left: labeled_int(line, "left_x:")?,
            top: labeled_int(line, "top_y:")?,
            width: labeled_int(line, "width:")?,
            height: labeled_int(line, "height:")?,
        })
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

fn labeled_int(line: &str, label: &str) -> Option<i32> {
    let idx = line.find(label)? + label.len();
    line[idx..]
        .split(|c: char| c.is_whitespace() || c == ')')
        .find(|tok| !tok.is_empty())?
        .parse()
        .ok()
}

/// Everything the detector found in one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDetections {
    /// The image path as written by the detector.
    pub path: PathBuf,
    pub boxes: Vec<DetectionBox>,
}

/// A detected burst on a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedBurst {
    pub station: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl DetectedBurst {
    fn time_range(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl ImageDetections {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Convert each box's horizontal extent to a burst time.
    ///
    /// `img_width` is the width of the image the detector saw, which may differ from the PNG on
    /// disk. Bursts that run past midnight are split at the day boundary.
    pub fn burst_intervals(&self, img_width: u32) -> Result<Vec<DetectedBurst>, ParseError> {
        let fname = self.file_name();
        let file = ArchiveFileName::parse(&fname)?;
        if img_width == 0 {
            return Err(ParseError::new("image width must be positive", &fname));
        }

        let total = OBSERVATION_MINUTES as f64;
        let mut bursts = vec![];

        for b in &self.boxes {
            let start_min = (b.left as f64 / img_width as f64 * total).max(0.0);
            let end_min = (b.right() as f64 / img_width as f64 * total).min(total);

            let start = file.start + Duration::milliseconds((start_min * 60_000.0) as i64);
            let end = file.start + Duration::milliseconds((end_min * 60_000.0) as i64);

            let minute = |t: NaiveTime| t.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(t);

            if start.date() == end.date() {
                bursts.push(DetectedBurst {
                    station: file.station.clone(),
                    date: start.date(),
                    start: minute(start.time()),
                    end: minute(end.time()),
                });
            } else {
                bursts.push(DetectedBurst {
                    station: file.station.clone(),
                    date: start.date(),
                    start: minute(start.time()),
                    end: NaiveTime::from_hms(23, 59, 0),
                });
                bursts.push(DetectedBurst {
                    station: file.station.clone(),
                    date: end.date(),
                    start: NaiveTime::from_hms(0, 0, 0),
                    end: minute(end.time()),
                });
            }
        }

        Ok(bursts)
    }
}

/// Parse detector output, keeping the images whose path starts with `image_prefix`.
///
/// Images with no detections are left out.
pub fn parse_predictions(text: &str, image_prefix: &str) -> Vec<ImageDetections> {
    let mut images: Vec<ImageDetections> = vec![];
    let mut current: Option<ImageDetections> = None;

    for line in text.lines() {
        if line.starts_with(image_prefix) {
            if let Some(done) = current.take() {
                images.push(done);
            }

            current = line.find(".png").map(|end| ImageDetections {
                path: PathBuf::from(&line[..end + 4]),
                boxes: vec![],
            });
        } else if line.starts_with("Burst") {
            match (current.as_mut(), DetectionBox::parse(line)) {
                (Some(img), Some(b)) => img.boxes.push(b),
                (_, None) => debug!(target: "detection", "unreadable detection: {}", line),
                (None, Some(_)) => {}
            }
        } else if let Some(done) = current.take() {
            images.push(done);
        }
    }
    if let Some(done) = current.take() {
        images.push(done);
    }

    images.retain(|img| !img.boxes.is_empty());
    images
}

/*-------------------------------------------------------------------------------------------------
 *                                       Report output
 *-----------------------------------------------------------------------------------------------*/
const DATE_COL: usize = 16;
const TIME_COL: usize = 16;
const TYPE_COL: usize = 8;

/// Writes burst list style reports.
pub trait ReportWriter {
    fn output(&mut self) -> &mut dyn Write;

    fn start_document(&mut self) -> CallistoResult<()> {
        writeln!(
            self.output(),
            "{:<dw$} {:<tw$} {:<yw$} Stations",
            "#Date",
            "Time",
            "Type",
            dw = DATE_COL,
            tw = TIME_COL,
            yw = TYPE_COL
        )?;
        writeln!(self.output(), "#{}", "-".repeat(79))?;
        Ok(())
    }

    /// One row. Detected bursts have no type, so it is reported as `?`.
    fn write_row(&mut self, date: &str, time_range: &str, burst_type: &str, stations: &[&str]) -> CallistoResult<()> {
        writeln!(
            self.output(),
            "{:<dw$} {:<tw$} {:<yw$} {}",
            date,
            time_range,
            burst_type,
            stations.join(", "),
            dw = DATE_COL,
            tw = TIME_COL,
            yw = TYPE_COL
        )?;
        Ok(())
    }
}

pub struct ReportFile(BufWriter<File>);

impl ReportFile {
    pub fn new<P: AsRef<Path>>(pth: P) -> CallistoResult<Self> {
        let f = File::create(pth.as_ref())?;
        let mut new = ReportFile(BufWriter::new(f));
        new.start_document()?;
        Ok(new)
    }
}

impl ReportWriter for ReportFile {
    fn output(&mut self) -> &mut dyn Write {
        &mut self.0
    }
}

impl<W: Write> ReportWriter for BufWriter<W> {
    fn output(&mut self) -> &mut dyn Write {
        self
    }
}

/// Group bursts that share a date and time range, one row each, sorted by date and time.
pub fn write_report<R: ReportWriter>(out: &mut R, bursts: &[DetectedBurst]) -> CallistoResult<usize> {
    let mut grouped: BTreeMap<(String, String), BTreeSet<&str>> = BTreeMap::new();

    for b in bursts {
        grouped
            .entry((b.date.format("%Y%m%d").to_string(), b.time_range()))
            .or_default()
            .insert(&b.station);
    }

    for ((date, time), stations) in &grouped {
        let stations: Vec<&str> = stations.iter().copied().collect();
        out.write_row(date, time, "?", &stations)?;
    }
    out.output().flush()?;

    Ok(grouped.len())
}

/*-------------------------------------------------------------------------------------------------
 *                                      Image handling
 *-----------------------------------------------------------------------------------------------*/
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy `src` to `dest` with each box outlined. Boxes are clipped to the image.
pub fn overlay_boxes<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dest: Q,
    boxes: &[DetectionBox],
) -> CallistoResult<()> {
    let mut img = image::open(src.as_ref())?.to_rgb8();
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err("empty image".into());
    }

    let clamp_x = |x: i32| x.clamp(0, w as i32 - 1) as u32;
    let clamp_y = |y: i32| y.clamp(0, h as i32 - 1) as u32;

    for b in boxes {
        let (x0, x1) = (clamp_x(b.left), clamp_x(b.right()));
        let (y0, y1) = (clamp_y(b.top), clamp_y(b.bottom()));

        for x in x0..=x1 {
            img.put_pixel(x, y0, BOX_COLOR);
            img.put_pixel(x, y1, BOX_COLOR);
        }
        for y in y0..=y1 {
            img.put_pixel(x0, y, BOX_COLOR);
            img.put_pixel(x1, y, BOX_COLOR);
        }
    }

    img.save_with_format(dest.as_ref(), image::ImageFormat::Png)?;
    Ok(())
}

/// Write the path of every PNG directly inside `dir`, one per line, for the detector to read.
pub fn write_image_list<P: AsRef<Path>, Q: AsRef<Path>>(dir: P, dest: Q) -> CallistoResult<usize> {
    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|res| res.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|ex| ex == "png").unwrap_or(false))
        .collect();
    paths.sort();

    let mut out = BufWriter::new(File::create(dest.as_ref())?);
    for path in &paths {
        writeln!(out, "{}", path.display())?;
    }
    out.flush()?;

    Ok(paths.len())
}
