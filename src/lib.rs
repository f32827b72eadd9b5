//! Fetch e-Callisto solar radio spectrograms from the public archive and convert them.
//!
//! Files are selected either from a catalog of reported solar bursts, keeping only the 15 minute
//! observations that overlap a burst, or in bulk for one station over a range of days. Each file
//! is downloaded and kept compressed, decompressed, dumped as a NumPy array, or rendered as a
//! false color PNG.

pub use archive::{ArchiveClient, DayListing, HttpArchive};
pub use catalog::{exclusion_from_dir, unique_dates, BurstCatalog, BurstRecord};
pub use config::{
    burst_output_dir, station_output_dir, validate_station, ArchiveConfig, OutputFormat,
    DEFAULT_ARCHIVE_URL, KNOWN_STATIONS, VALID_SPLITS,
};
pub use driver::{partition, BatchDriver, RunSummary, WorkerBatch};
pub use error::{CallistoResult, DecodeError, FetchError, ParseError};
pub use filename::{parse_date, parse_hhmm, render, ArchiveFileName};
pub use fits::FitsImage;
pub use matcher::{file_in_window, segment_indices, BurstMatcher, BurstWindow, ErrorLog};
pub use pipeline::{OutputSink, Pipeline, SkipReason, StepError, StepResult};
pub use planner::{DayPlan, FetchPlanner, FetchTask, PlannedFile, Selection};
pub use render::{RowNormalization, Spectrogram};

pub mod catalog;
pub mod detection;
pub mod npy;

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod archive;
mod config;
mod driver;
mod error;
mod filename;
mod fits;
mod matcher;
mod pipeline;
mod planner;
mod render;
