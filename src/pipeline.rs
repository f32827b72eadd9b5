/*!
 * Download planned files and convert them to the requested output.
 *
 * Every file goes through the same steps: work out what it should produce, skip it if all of that
 * already exists, download it to a staging file next to the outputs, convert, and clean up the
 * staging file.
 */

use crate::{
    archive::ArchiveClient,
    catalog::BurstRecord,
    config::{ArchiveConfig, OutputFormat},
    error::{DecodeError, FetchError, ParseError},
    filename::ArchiveFileName,
    fits::FitsImage,
    matcher::segments_for_start,
    npy,
    planner::PlannedFile,
    render::{RowNormalization, Spectrogram, TRAILING_ROWS},
};
use flate2::read::GzDecoder;
use log::{debug, warn};
use std::{
    error::Error,
    fmt::{Display, Formatter},
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

/// What to turn each downloaded file into. Chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    /// Keep the `.fit.gz` as downloaded.
    Compressed,
    /// Decompress to `.fit`.
    RawCopy,
    /// Primary image as a `.npy` float32 array.
    ArrayDump,
    /// False color `.png`, optionally split in time.
    ImageRender(RowNormalization),
}

impl OutputSink {
    pub fn new(format: OutputFormat, normalization: RowNormalization) -> Self {
        match format {
            OutputFormat::Gz => OutputSink::Compressed,
            OutputFormat::Fit => OutputSink::RawCopy,
            OutputFormat::Npy => OutputSink::ArrayDump,
            OutputFormat::Png => OutputSink::ImageRender(normalization),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputSink::Compressed => OutputFormat::Gz.extension(),
            OutputSink::RawCopy => OutputFormat::Fit.extension(),
            OutputSink::ArrayDump => OutputFormat::Npy.extension(),
            OutputSink::ImageRender(_) => OutputFormat::Png.extension(),
        }
    }
}

/// Why a file was not fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Every output for the file is already on disk.
    AlreadyPresent,
    /// None of the file's time segments overlap the burst.
    NoSegments,
}

/// Why a file could not be processed.
#[derive(Debug)]
pub enum StepError {
    Name(ParseError),
    Fetch(FetchError),
    Decode(DecodeError),
}

impl Display for StepError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        match self {
            StepError::Name(err) => write!(f, "{}", err),
            StepError::Fetch(err) => write!(f, "{}", err),
            StepError::Decode(err) => write!(f, "{}", err),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StepError::Name(err) => Some(err),
            StepError::Fetch(err) => Some(err),
            StepError::Decode(err) => Some(err),
        }
    }
}

/// Outcome of one planned file.
#[derive(Debug)]
pub enum StepResult {
    Written(Vec<PathBuf>),
    Skipped(SkipReason),
    Failed(StepError),
}

/// Converts planned files into outputs in a single directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: ArchiveConfig,
    sink: OutputSink,
    splits: usize,
    out_dir: PathBuf,
}

impl Pipeline {
    pub fn new<P: AsRef<Path>>(config: ArchiveConfig, sink: OutputSink, splits: usize, out_dir: P) -> Self {
        Pipeline {
            config,
            sink,
            splits,
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Fetch and convert one file. Never panics, failures are reported in the result.
    pub fn process<C: ArchiveClient>(&self, client: &C, planned: &PlannedFile) -> StepResult {
        let name = match self.output_name(planned) {
            Ok(name) => name,
            Err(err) => return StepResult::Failed(StepError::Name(err)),
        };

        let outputs = self.segment_outputs(&name, planned.record.as_ref());
        if outputs.is_empty() {
            return StepResult::Skipped(SkipReason::NoSegments);
        }

        if outputs.iter().all(|(_, p)| p.exists()) {
            debug!(target: "pipeline", "already have {}", name.render());
            return StepResult::Skipped(SkipReason::AlreadyPresent);
        }

        if let Err(err) = std::fs::create_dir_all(&self.out_dir) {
            return StepResult::Failed(StepError::Fetch(FetchError::Io(err)));
        }

        let staged = self
            .out_dir
            .join(name.with_extension(self.config.archive_suffix).render());

        if let Err(err) = client.download(planned.date, &planned.fname, &staged) {
            warn!(target: "pipeline", "failed to download {}: {}", planned.fname, err);
            remove_quietly(&staged);
            return StepResult::Failed(StepError::Fetch(err));
        }

        let result = self.convert(&staged, &outputs);

        if self.sink != OutputSink::Compressed {
            remove_quietly(&staged);
        }

        let paths: Vec<PathBuf> = outputs.into_iter().map(|(_, p)| p).collect();

        match result {
            Ok(()) => StepResult::Written(paths),
            Err(err) => {
                warn!(target: "pipeline", "failed to convert {}: {}", planned.fname, err);
                if self.sink != OutputSink::Compressed {
                    paths.iter().for_each(|p| remove_quietly(p));
                }
                StepResult::Failed(StepError::Decode(err))
            }
        }
    }

    /// The archive name, tagged with the burst type when fetching a catalogued burst.
    fn output_name(&self, planned: &PlannedFile) -> Result<ArchiveFileName, ParseError> {
        let mut name = ArchiveFileName::parse(&planned.fname)?;
        name.burst_type = planned.record.as_ref().map(|r| r.burst_type.clone());
        Ok(name.with_extension(self.sink.extension()))
    }

    /// Every path the sink will write for a file.
    ///
    /// Split images are named for the start time of their segment.
    pub fn expected_outputs(&self, name: &ArchiveFileName, record: Option<&BurstRecord>) -> Vec<PathBuf> {
        self.segment_outputs(name, record)
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Output paths paired with the time segment they hold, `0` when the file isn't split.
    fn segment_outputs(&self, name: &ArchiveFileName, record: Option<&BurstRecord>) -> Vec<(usize, PathBuf)> {
        let name = name.with_extension(self.sink.extension());

        if !matches!(self.sink, OutputSink::ImageRender(_)) || self.splits == 0 {
            return vec![(0, self.out_dir.join(name.render()))];
        }

        let segment_seconds = self.config.observation_minutes as i64 * 60 / self.splits as i64;

        let indices: Vec<usize> = match record {
            Some(rec) => segments_for_start(&name.start, &rec.window(), self.splits)
                .into_iter()
                .collect(),
            None => (0..self.splits).collect(),
        };

        indices
            .into_iter()
            .map(|i| {
                let path = self
                    .out_dir
                    .join(name.shifted(i as i64 * segment_seconds).render());
                (i, path)
            })
            .collect()
    }

    fn convert(&self, staged: &Path, outputs: &[(usize, PathBuf)]) -> Result<(), DecodeError> {
        let first = match outputs.first() {
            Some((_, path)) => path,
            None => return Ok(()),
        };

        match self.sink {
            OutputSink::Compressed => Ok(()),

            OutputSink::RawCopy => {
                let mut src = GzDecoder::new(File::open(staged)?);
                let mut dest = BufWriter::new(File::create(first)?);
                std::io::copy(&mut src, &mut dest)?;
                Ok(())
            }

            OutputSink::ArrayDump => {
                let img = FitsImage::open(staged)?;
                npy::save_f32(first, img.rows, img.cols, &img.to_f32())?;
                Ok(())
            }

            OutputSink::ImageRender(normalization) => {
                let img = FitsImage::open(staged)?;
                let data = img.to_u8().into_iter().map(f32::from).collect();
                let spectrogram = Spectrogram::new(img.rows, img.cols, data)?
                    .trim_bottom(TRAILING_ROWS)?
                    .normalize(normalization);

                if self.splits == 0 {
                    return spectrogram.save_png(first);
                }

                let pieces = spectrogram.split_columns(self.splits);
                for (idx, path) in outputs {
                    pieces[*idx].save_png(path)?;
                }

                Ok(())
            }
        }
    }
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(target: "pipeline", "unable to remove {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{archive::DayListing, filename::parse_hhmm, fits::test_fits_u8};
    use chrono::NaiveDate;
    use flate2::{write::GzEncoder, Compression};
    use image::GenericImageView;
    use std::{cell::Cell, io::Write};
    use tempdir::TempDir;

    const FNAME: &str = "KRIM_20210301_010000_01.fit.gz";

    /// Serves the same payload for every download.
    struct FakeArchive {
        payload: Vec<u8>,
        downloads: Cell<usize>,
    }

    impl FakeArchive {
        fn with_fits(rows: usize, cols: usize) -> Self {
            let mut enc = GzEncoder::new(vec![], Compression::default());
            enc.write_all(&test_fits_u8(rows, cols, |r, c| ((r + c) % 13) as u8))
                .unwrap();

            FakeArchive {
                payload: enc.finish().unwrap(),
                downloads: Cell::new(0),
            }
        }
    }

    impl ArchiveClient for FakeArchive {
        fn list_day(&self, _: NaiveDate) -> Result<DayListing, FetchError> {
            Ok(DayListing::Entries(vec![FNAME.to_owned()]))
        }

        fn download(&self, _: NaiveDate, _: &str, dest: &Path) -> Result<(), FetchError> {
            self.downloads.set(self.downloads.get() + 1);
            std::fs::write(dest, &self.payload)?;
            Ok(())
        }
    }

    fn planned(record: Option<BurstRecord>) -> PlannedFile {
        PlannedFile {
            date: NaiveDate::from_ymd(2021, 3, 1),
            fname: FNAME.to_owned(),
            record,
        }
    }

    fn burst(start: &str, end: &str) -> BurstRecord {
        BurstRecord {
            station: "KRIM".to_owned(),
            date: NaiveDate::from_ymd(2021, 3, 1),
            start: parse_hhmm(start).unwrap(),
            end: parse_hhmm(end).unwrap(),
            burst_type: "III".to_owned(),
        }
    }

    fn file_names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_expected_outputs() {
        let name = ArchiveFileName::parse(FNAME).unwrap();
        let sink = OutputSink::ImageRender(RowNormalization::None);

        let pipe = Pipeline::new(ArchiveConfig::default(), sink, 3, "/out");
        assert_eq!(
            file_names(&pipe.expected_outputs(&name, None)),
            vec![
                "KRIM_20210301_010000_01.png",
                "KRIM_20210301_010500_01.png",
                "KRIM_20210301_011000_01.png",
            ]
        );

        let rec = burst("0110", "0115");
        assert_eq!(
            file_names(&pipe.expected_outputs(&name, Some(&rec))),
            vec!["KRIM_20210301_011000_01.png"]
        );

        let pipe = Pipeline::new(ArchiveConfig::default(), OutputSink::ArrayDump, 3, "/out");
        assert_eq!(
            file_names(&pipe.expected_outputs(&name, Some(&rec))),
            vec!["KRIM_20210301_010000_01.npy"]
        );
    }

    #[test]
    fn test_burst_png_segments_and_rerun() {
        let tmp = TempDir::new("callisto-pipeline").unwrap();
        let archive = FakeArchive::with_fits(20, 30);
        let sink = OutputSink::ImageRender(RowNormalization::None);
        let pipe = Pipeline::new(ArchiveConfig::default(), sink, 3, tmp.path());

        let job = planned(Some(burst("0104", "0111")));

        match pipe.process(&archive, &job) {
            StepResult::Written(paths) => {
                assert_eq!(
                    file_names(&paths),
                    vec![
                        "KRIM_20210301_010000_01_III.png",
                        "KRIM_20210301_010500_01_III.png",
                        "KRIM_20210301_011000_01_III.png",
                    ]
                );

                let img = image::open(&paths[0]).unwrap();
                assert_eq!((img.width(), img.height()), (10, 10));
            }
            other => panic!("unexpected result {:?}", other),
        }

        // The staged download is gone.
        assert!(!tmp.path().join("KRIM_20210301_010000_01_III.fit.gz").exists());

        assert!(matches!(
            pipe.process(&archive, &job),
            StepResult::Skipped(SkipReason::AlreadyPresent)
        ));
        assert_eq!(archive.downloads.get(), 1);
    }

    #[test]
    fn test_compressed_and_raw_copy() {
        let tmp = TempDir::new("callisto-pipeline").unwrap();
        let archive = FakeArchive::with_fits(12, 4);

        let pipe = Pipeline::new(ArchiveConfig::default(), OutputSink::Compressed, 0, tmp.path());
        assert!(matches!(pipe.process(&archive, &planned(None)), StepResult::Written(_)));
        assert!(tmp.path().join(FNAME).exists());

        let pipe = Pipeline::new(ArchiveConfig::default(), OutputSink::RawCopy, 0, tmp.path());
        assert!(matches!(pipe.process(&archive, &planned(None)), StepResult::Written(_)));
        let raw = std::fs::read(tmp.path().join("KRIM_20210301_010000_01.fit")).unwrap();
        assert!(raw.starts_with(b"SIMPLE"));
        assert_eq!(raw.len() % 2880, 0);
    }

    #[test]
    fn test_decode_failure_cleans_up() {
        let tmp = TempDir::new("callisto-pipeline").unwrap();
        let archive = FakeArchive {
            payload: b"<html>404 Not Found</html>".to_vec(),
            downloads: Cell::new(0),
        };

        let pipe = Pipeline::new(ArchiveConfig::default(), OutputSink::ArrayDump, 0, tmp.path());
        assert!(matches!(
            pipe.process(&archive, &planned(None)),
            StepResult::Failed(StepError::Decode(_))
        ));

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
