//! Write 2-D float arrays in the NumPy `.npy` (version 1.0) format.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Alignment of the start of the data, including the magic and header.
const ALIGN: usize = 64;

/// Build the magic, version, and padded header for a little-endian `f32` C order array.
fn header(rows: usize, cols: usize) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        rows, cols
    );

    // magic + version + u16 length + dict + padding + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(unpadded + padding);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');

    out
}

/// Write a `rows` x `cols` row major array to `writer`.
pub fn write_f32<W: Write>(writer: &mut W, rows: usize, cols: usize, data: &[f32]) -> std::io::Result<()> {
    if data.len() != rows * cols {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "array length does not match its shape",
        ));
    }

    writer.write_all(&header(rows, cols))?;
    for v in data {
        writer.write_all(&v.to_le_bytes())?;
    }

    Ok(())
}

/// Write a `rows` x `cols` row major array to a new file at `path`.
pub fn save_f32<P: AsRef<Path>>(path: P, rows: usize, cols: usize, data: &[f32]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_f32(&mut out, rows, cols, data)?;
    out.flush()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut buf = vec![];
        write_f32(&mut buf, 2, 3, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.5]).unwrap();

        assert_eq!(&buf[..6], MAGIC);
        assert_eq!(&buf[6..8], &[1, 0]);

        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        let data_start = 10 + header_len;
        assert_eq!(data_start % ALIGN, 0);
        assert_eq!(buf[data_start - 1], b'\n');

        let dict = std::str::from_utf8(&buf[10..data_start]).unwrap();
        assert!(dict.starts_with("{'descr': '<f4', 'fortran_order': False, 'shape': (2, 3), }"));

        assert_eq!(buf.len(), data_start + 6 * 4);
        assert_eq!(&buf[buf.len() - 4..], &5.5f32.to_le_bytes());
    }

    #[test]
    fn test_shape_mismatch() {
        let mut buf = vec![];
        assert!(write_f32(&mut buf, 2, 2, &[1.0]).is_err());
    }
}
