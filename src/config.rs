/*! Run configuration shared by the planner, pipeline, and driver.
 *
 * Everything here is immutable once built. Workers each get a clone.
 */

use std::path::{Path, PathBuf};
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Root of the e-Callisto data archive, organized as `YYYY/MM/DD/`.
pub const DEFAULT_ARCHIVE_URL: &str =
    "http://soleil80.cs.technik.fhnw.ch/solarradio/data/2002-20yy_Callisto/";

/// Split counts that divide a 15 minute observation into whole minutes.
pub const VALID_SPLITS: [usize; 4] = [0, 3, 5, 15];

/// Stations known to publish to the archive.
pub const KNOWN_STATIONS: &[&str] = &[
    "ALASKA-ANCHORAGE", "ALASKA-COHOE", "ALASKA-HAARP", "ALGERIA-CRAAG", "ALMATY",
    "AUSTRIA-Krumbach", "AUSTRIA-MICHELBACH", "Acreibo-observatory", "AUSTRIA-OE3FLB",
    "AUSTRIA-UNIGRAZ", "Australia-ASSA", "Australia-LMRO", "DENMARK", "GLASGOW", "EGYPT",
    "GERMANY-DLR", "GREENLAND", "HUMAIN", "HURBANOVO", "INDIA-GAURI", "INDIA-IISERP",
    "INDIA-Nashik", "INDIA-OOTY", "INDIA-UDAIPUR", "INDONESIA", "JAPAN-IBARAKI", "KASI", "KRIM",
    "MEXART", "MONGOLIA-GOBI", "MONGOLIA-UB", "MRO", "NEWZEALAND-AUT", "NORWAY-NY-AALESUND",
    "NORWAY-RANDABERG", "ROSWELL-NM", "SOUTHAFRICA-SANSA", "SPAIN-ALCALA", "SPAIN-PERALEJOS",
    "SPAIN-SIGUENZA", "SWISS-BLEN5M", "SWISS-BLEN7M", "SWISS-HB9SCT", "SWISS-IRSOL",
    "SWISS-Landschlacht", "SWISS-MUHEN", "TRIEST", "URUGUAY", "USA-ARIZONA-ERAU",
];

/// Station names that contain the field delimiter and so span two tokens of a file name.
pub const TWO_TOKEN_STATIONS: &[(&str, &str)] = &[("Malaysia", "Banting")];

/// What the pipeline writes for each downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the compressed download untouched.
    #[strum(serialize = "gz")]
    Gz,
    /// The decompressed FITS file.
    Fit,
    /// The primary image as a NumPy float32 array.
    Npy,
    /// A false color rendering of the spectrogram.
    Png,
}

impl OutputFormat {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        use OutputFormat::*;

        match self {
            Gz => ".fit.gz",
            Fit => ".fit",
            Npy => ".npy",
            Png => ".png",
        }
    }

    /// Short name used in output directory names.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Everything about the remote archive the fetch code needs to know.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Base URL, always ending in '/'.
    pub base_url: String,
    /// Suffix of the compressed observation files in a day listing.
    pub archive_suffix: &'static str,
    /// Text in a listing body that signals there is no data for that day.
    pub no_data_marker: &'static str,
    /// Length of one observation file.
    pub observation_minutes: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            base_url: DEFAULT_ARCHIVE_URL.to_owned(),
            archive_suffix: ".fit.gz",
            no_data_marker: "404 Not Found",
            observation_minutes: 15,
        }
    }
}

impl ArchiveConfig {
    /// Build a configuration pointing at a different archive root.
    pub fn with_base_url(base_url: &str) -> Self {
        let mut base_url = base_url.to_owned();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        ArchiveConfig {
            base_url,
            ..ArchiveConfig::default()
        }
    }

    /// The listing URL for one calendar day.
    pub fn day_url(&self, date: chrono::NaiveDate) -> String {
        format!("{}{}/", self.base_url, date.format("%Y/%m/%d"))
    }

    /// Check that a split count is one that divides an observation into whole minutes.
    pub fn validate_splits(&self, splits: usize) -> Result<usize, String> {
        if VALID_SPLITS.contains(&splits) {
            Ok(splits)
        } else {
            Err(format!(
                "invalid number of splits {}, possible values are {:?}",
                splits, VALID_SPLITS
            ))
        }
    }
}

/// Check a station name against the list of known stations.
pub fn validate_station(station: &str) -> Result<String, String> {
    if KNOWN_STATIONS.contains(&station)
        || TWO_TOKEN_STATIONS
            .iter()
            .any(|(a, b)| format!("{}_{}", a, b) == station)
    {
        Ok(station.to_owned())
    } else {
        Err(format!("unknown station: {}", station))
    }
}

/// Directory for files downloaded from the burst catalog.
pub fn burst_output_dir<P: AsRef<Path>>(
    root: P,
    format: OutputFormat,
    splits: usize,
    include_long_bursts: bool,
) -> PathBuf {
    let leaf = if include_long_bursts {
        format!("{}s_{}splits", format.name(), splits)
    } else {
        format!("{}s_15min_{}splits", format.name(), splits)
    };

    root.as_ref().join("Solar_bursts_files").join(leaf)
}

/// Directory for a bulk station download.
///
/// `WSB` (with solar bursts) when nothing was excluded, `NSB` (no solar bursts) when the known
/// burst files were left out.
pub fn station_output_dir<P: AsRef<Path>>(
    root: P,
    station: &str,
    splits: usize,
    excluded_bursts: bool,
) -> PathBuf {
    let tag = if excluded_bursts { "NSB" } else { "WSB" };
    root.as_ref()
        .join("Instruments")
        .join(format!("{}_{}_{}splits", station, tag, splits))
}
