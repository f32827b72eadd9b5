/*!
 * Read the primary image of a Callisto spectrogram.
 *
 * For Callisto files `NAXIS1` is time and `NAXIS2` is frequency, highest frequency first. The
 * frequency and time axis table in the first extension is not read.
 */

use crate::error::DecodeError;
use fitsio::{hdu::HduInfo, FitsFile};
use std::{
    path::Path,
    sync::{Mutex, PoisonError},
};

/// Largest image accepted, in pixels. Callisto files hold a few hundred channels by 3600 samples.
const MAX_PIXELS: usize = 1 << 26;

/// cfitsio keeps global state unless it was built reentrant.
static CFITSIO: Mutex<()> = Mutex::new(());

/// The primary image of a FITS file with `BSCALE`/`BZERO` applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsImage {
    /// Number of rows (NAXIS2), frequency channels for Callisto data.
    pub rows: usize,
    /// Number of columns (NAXIS1), time samples for Callisto data.
    pub cols: usize,
    /// Row major values.
    pub data: Vec<f64>,
}

impl FitsImage {
    /// Read a FITS file on disk, gzip compressed or not.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let _guard = CFITSIO.lock().unwrap_or_else(PoisonError::into_inner);

        let mut fptr = FitsFile::open(path.as_ref())?;
        let hdu = fptr.primary_hdu()?;

        let (rows, cols) = match hdu.info {
            HduInfo::ImageInfo { ref shape, .. } => match shape[..] {
                [rows, cols] => (rows, cols),
                _ => return Err(DecodeError::Fits("primary image is not 2-D")),
            },
            _ => return Err(DecodeError::Fits("primary HDU is not an image")),
        };

        let count = image_size(rows, cols)?;

        let data: Vec<f64> = hdu.read_image(&mut fptr)?;
        if data.len() != count {
            return Err(DecodeError::Fits("truncated image data"));
        }

        Ok(FitsImage { rows, cols, data })
    }

    /// The image as single precision floats.
    pub fn to_f32(&self) -> Vec<f32> {
        self.data.iter().map(|&v| v as f32).collect()
    }

    /// The image as unsigned bytes.
    ///
    /// Values are truncated toward zero and wrapped modulo 256, the way a NumPy `uint8` cast of
    /// the same data behaves.
    pub fn to_u8(&self) -> Vec<u8> {
        self.data.iter().map(|&v| v as i64 as u8).collect()
    }
}

fn image_size(rows: usize, cols: usize) -> Result<usize, DecodeError> {
    if rows == 0 || cols == 0 {
        return Err(DecodeError::Fits("empty image"));
    }

    rows.checked_mul(cols)
        .filter(|&n| n <= MAX_PIXELS)
        .ok_or(DecodeError::Fits("image too large"))
}

#[cfg(test)]
pub(crate) const TEST_BLOCK: usize = 2880;

/// Build a minimal FITS file from header cards and a data unit. Used by tests here and in the
/// pipeline.
#[cfg(test)]
pub(crate) fn test_fits_raw(cards: &[String], data: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = vec![];
    for card in cards.iter().chain(std::iter::once(&"END".to_owned())) {
        out.extend(format!("{:<80}", card).bytes());
    }
    while out.len() % TEST_BLOCK != 0 {
        out.push(b' ');
    }

    out.extend_from_slice(data);
    while out.len() % TEST_BLOCK != 0 {
        out.push(0);
    }

    out
}

#[cfg(test)]
pub(crate) fn test_fits_u8(rows: usize, cols: usize, pixel: impl Fn(usize, usize) -> u8) -> Vec<u8> {
    let cards = [
        format!("{:<8}= {:>20}", "SIMPLE", "T"),
        format!("{:<8}= {:>20}", "BITPIX", 8),
        format!("{:<8}= {:>20}", "NAXIS", 2),
        format!("{:<8}= {:>20} / time", "NAXIS1", cols),
        format!("{:<8}= {:>20} / frequency", "NAXIS2", rows),
        format!("{:<8}= {:<20}", "OBJECT", "'Sun     '"),
    ];

    let mut data = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            data.push(pixel(r, c));
        }
    }

    test_fits_raw(&cards, &data)
}
