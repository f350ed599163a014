//! Minimal NumPy `.npy` v1.0 codec for the raw embedding matrix artifact.
//!
//! Only the shape this crate writes is supported: little-endian f32,
//! C-contiguous, 2-D.

use anyhow::{bail, Context, Result};
use std::io::{Read, Write};
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Write a row-major (n, dim) f32 matrix. Returns bytes written.
pub fn write_matrix(path: &Path, data: &[f32], n: usize, dim: usize) -> Result<u64> {
    if data.len() != n * dim {
        bail!("matrix data length {} does not match shape ({n}, {dim})", data.len());
    }

    let header_dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({n}, {dim}), }}"
    );
    // Pad so magic + version + length field + header is 64-byte aligned,
    // with a trailing newline as numpy emits.
    let unpadded = MAGIC.len() + 2 + 2 + header_dict.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    let mut header = header_dict.into_bytes();
    header.extend(std::iter::repeat(b' ').take(padding));
    header.push(b'\n');

    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[0x01, 0x00])?;
    writer.write_all(&(header.len() as u16).to_le_bytes())?;
    writer.write_all(&header)?;
    for value in data {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(std::fs::metadata(path)?.len())
}

/// Read a matrix written by [`write_matrix`]. Returns (data, n, dim).
pub fn read_matrix(path: &Path) -> Result<(Vec<f32>, usize, usize)> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic[..6] != MAGIC {
        bail!("not an npy file: {}", path.display());
    }

    let mut len_bytes = [0u8; 2];
    file.read_exact(&mut len_bytes)?;
    let header_len = u16::from_le_bytes(len_bytes) as usize;
    let mut header = vec![0u8; header_len];
    file.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    if !header.contains("'descr': '<f4'") || !header.contains("'fortran_order': False") {
        bail!("unsupported npy layout: {header}");
    }
    let (n, dim) = parse_shape(&header)?;

    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    if raw.len() != n * dim * 4 {
        bail!("npy payload is {} bytes, expected {}", raw.len(), n * dim * 4);
    }
    let data = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((data, n, dim))
}

fn parse_shape(header: &str) -> Result<(usize, usize)> {
    let start = header
        .find("'shape': (")
        .context("npy header missing shape")?
        + "'shape': (".len();
    let end = header[start..]
        .find(')')
        .context("npy header shape unterminated")?
        + start;
    let parts: Vec<usize> = header[start..end]
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse().context("bad shape component"))
        .collect::<Result<_>>()?;
    match parts.as_slice() {
        [n, dim] => Ok((*n, *dim)),
        other => bail!("expected 2-D shape, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.npy");

        let data: Vec<f32> = (0..12).map(|i| i as f32 * 0.25).collect();
        let bytes = write_matrix(&path, &data, 3, 4).unwrap();
        assert!(bytes > 0);

        let (read, n, dim) = read_matrix(&path).unwrap();
        assert_eq!((n, dim), (3, 4));
        assert_eq!(read, data);
    }

    #[test]
    fn test_header_is_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.npy");
        write_matrix(&path, &[1.0, 2.0], 1, 2).unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..6], MAGIC);
        let header_len = u16::from_le_bytes([raw[8], raw[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        // float payload follows immediately after the header
        assert_eq!(raw.len(), 10 + header_len + 8);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        assert!(write_matrix(&path, &[1.0; 5], 2, 3).is_err());
    }
}
