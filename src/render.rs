/*!
 * False color rendering of spectrograms.
 *
 * One pixel per sample. Row 0 of the data (highest frequency) is the top of the image and time
 * runs left to right.
 */

use crate::error::DecodeError;
use image::{Rgb, RgbImage};
use std::path::Path;

/// Rows at the bottom of every Callisto image that hold calibration marks, not data.
pub const TRAILING_ROWS: usize = 10;

/// Value mapped to the bottom of the color scale.
pub const VMIN: f32 = 0.0;
/// Value mapped to the top of the color scale.
pub const VMAX: f32 = 12.0;

/// Per-row (per frequency channel) background removal applied before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowNormalization {
    /// Render the raw values.
    #[default]
    None,
    /// Subtract each row's mean.
    SubtractMean,
    /// Subtract each row's mean and divide by its standard deviation.
    Standardize,
}

/// A 2-D single precision grid, row major.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Spectrogram {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, DecodeError> {
        if data.len() != rows * cols {
            return Err(DecodeError::Fits("data length does not match image shape"));
        }
        Ok(Spectrogram { rows, cols, data })
    }

    fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Drop the calibration rows at the bottom.
    pub fn trim_bottom(self, n: usize) -> Result<Self, DecodeError> {
        if self.rows <= n {
            return Err(DecodeError::Fits("image has no rows left after trimming"));
        }

        let rows = self.rows - n;
        let mut data = self.data;
        data.truncate(rows * self.cols);

        Ok(Spectrogram {
            rows,
            cols: self.cols,
            data,
        })
    }

    pub fn normalize(mut self, how: RowNormalization) -> Self {
        if how == RowNormalization::None {
            return self;
        }

        let cols = self.cols;
        for row in self.data.chunks_exact_mut(cols) {
            let n = row.len() as f64;
            let mean = row.iter().map(|&v| v as f64).sum::<f64>() / n;

            match how {
                RowNormalization::SubtractMean => {
                    row.iter_mut().for_each(|v| *v = (*v as f64 - mean) as f32);
                }
                RowNormalization::Standardize => {
                    let var = row.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
                    let std = var.sqrt();
                    // A flat row gives NaN, rendered as background.
                    row.iter_mut()
                        .for_each(|v| *v = ((*v as f64 - mean) / std) as f32);
                }
                RowNormalization::None => {}
            }
        }

        self
    }

    /// Split along time into `n` near equal pieces. The first `cols % n` pieces get one extra
    /// column.
    pub fn split_columns(&self, n: usize) -> Vec<Spectrogram> {
        if n == 0 {
            return vec![];
        }

        let base = self.cols / n;
        let extra = self.cols % n;

        let mut pieces = Vec::with_capacity(n);
        let mut start = 0;
        for i in 0..n {
            let width = base + if i < extra { 1 } else { 0 };

            let mut data = Vec::with_capacity(width * self.rows);
            for r in 0..self.rows {
                data.extend_from_slice(&self.row(r)[start..start + width]);
            }

            pieces.push(Spectrogram {
                rows: self.rows,
                cols: width,
                data,
            });
            start += width;
        }

        pieces
    }

    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_fn(self.cols as u32, self.rows as u32, |x, y| {
            cmr_map(self.data[y as usize * self.cols + x as usize])
        })
    }

    /// Render and write a PNG.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<(), DecodeError> {
        if self.cols == 0 || self.rows == 0 {
            return Err(DecodeError::Fits("nothing to render"));
        }

        self.to_image()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/*-------------------------------------------------------------------------------------------------
 *                                        Color map
 *-----------------------------------------------------------------------------------------------*/
// CMRmap (Rappaport), control points evenly spaced on [0, 1].
const CMR_R: [f32; 9] = [0.00, 0.15, 0.30, 0.60, 1.00, 0.90, 0.90, 0.90, 1.00];
const CMR_G: [f32; 9] = [0.00, 0.15, 0.15, 0.20, 0.25, 0.50, 0.75, 0.90, 1.00];
const CMR_B: [f32; 9] = [0.00, 0.50, 0.75, 0.50, 0.15, 0.00, 0.10, 0.50, 1.00];

/// Number of discrete colors in the table.
const LUT_SIZE: usize = 256;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Map a value onto the color scale, clipping to `[VMIN, VMAX]`.
pub fn cmr_map(value: f32) -> Rgb<u8> {
    if !value.is_finite() {
        return BACKGROUND;
    }

    let x = ((value - VMIN) / (VMAX - VMIN)).clamp(0.0, 1.0);
    let idx = ((x * LUT_SIZE as f32) as usize).min(LUT_SIZE - 1);
    let pos = idx as f32 / (LUT_SIZE - 1) as f32;

    let seg = pos * (CMR_R.len() - 1) as f32;
    let lo = (seg.floor() as usize).min(CMR_R.len() - 2);
    let frac = seg - lo as f32;

    let interp = |table: &[f32; 9]| -> u8 {
        let v = table[lo] + (table[lo + 1] - table[lo]) * frac;
        (v * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgb([interp(&CMR_R), interp(&CMR_G), interp(&CMR_B)])
}

#[cfg(test)]
mod test {
    use super::*;

    fn grid(rows: usize, cols: usize) -> Spectrogram {
        let data = (0..rows * cols).map(|v| v as f32).collect();
        Spectrogram::new(rows, cols, data).unwrap()
    }

    #[test]
    fn test_colormap_ends() {
        assert_eq!(cmr_map(-5.0), Rgb([0, 0, 0]));
        assert_eq!(cmr_map(VMIN), Rgb([0, 0, 0]));
        assert_eq!(cmr_map(VMAX), Rgb([255, 255, 255]));
        assert_eq!(cmr_map(100.0), Rgb([255, 255, 255]));
        assert_eq!(cmr_map(f32::NAN), BACKGROUND);

        // Mid scale is the orange-red part of the map.
        let Rgb([r, g, b]) = cmr_map(6.0);
        assert!(r > 200 && g < 100 && b < 60);
    }

    #[test]
    fn test_split_columns() {
        let g = grid(2, 10);
        let widths: Vec<usize> = g.split_columns(3).iter().map(|p| p.cols).collect();
        assert_eq!(widths, vec![4, 3, 3]);

        let pieces = g.split_columns(3);
        assert_eq!(pieces[1].data, vec![4.0, 5.0, 6.0, 14.0, 15.0, 16.0]);
        assert!(g.split_columns(0).is_empty());
    }

    #[test]
    fn test_trim_and_normalize() {
        let g = grid(12, 4).trim_bottom(TRAILING_ROWS).unwrap();
        assert_eq!(g.rows, 2);
        assert_eq!(g.data.len(), 8);

        let n = g.clone().normalize(RowNormalization::SubtractMean);
        assert_eq!(n.data, vec![-1.5, -0.5, 0.5, 1.5, -1.5, -0.5, 0.5, 1.5]);

        let s = g.normalize(RowNormalization::Standardize);
        let sum: f32 = s.data[..4].iter().sum();
        assert!(sum.abs() < 1e-6);

        assert!(grid(10, 4).trim_bottom(TRAILING_ROWS).is_err());
    }

    #[test]
    fn test_image_orientation() {
        let g = Spectrogram::new(2, 2, vec![0.0, 0.0, 12.0, 12.0]).unwrap();
        let img = g.to_image();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(1, 1), Rgb([255, 255, 255]));
    }
}
