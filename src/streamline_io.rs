//! Streamline utilities and TrackVis (.trk) I/O
//!
//! TrackVis files start with a fixed 1000-byte little-endian header followed
//! by one record per streamline: an `i32` point count, then `x y z` (plus any
//! per-point scalars) as `f32`, then any per-streamline properties.
//! Coordinates are stored in "voxmm" space: voxel indices with the voxel
//! corner as origin, scaled by the voxel size.

use std::io::Write;
use std::path::Path;

use log::info;

use crate::error::{Result, TrackingError};
use crate::local_tracking::Streamline;
use crate::utils::affine::{apply_affine, invert_affine, voxel_sizes};

const HEADER_SIZE: usize = 1000;

/// Length of a streamline in world units
pub fn streamline_length(streamline: &[[f64; 3]]) -> f64 {
    streamline
        .windows(2)
        .map(|w| {
            let d = [w[1][0] - w[0][0], w[1][1] - w[0][1], w[1][2] - w[0][2]];
            (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
        })
        .sum()
}

/// Keep streamlines whose length lies in `[min_length, max_length]`
pub fn filter_by_length(streamlines: Vec<Streamline>, min_length: f64, max_length: f64) -> Vec<Streamline> {
    streamlines
        .into_iter()
        .filter(|s| {
            let l = streamline_length(s);
            l >= min_length && l <= max_length
        })
        .collect()
}

/// Header fields we read back from a .trk file
#[derive(Clone, Debug, PartialEq)]
pub struct TrkHeader {
    pub dims: [i16; 3],
    pub voxel_size: [f32; 3],
    /// Voxel to world transform, 4x4 row-major
    pub vox_to_ras: [f64; 16],
    /// Orientation codes such as `b"LAS"`
    pub voxel_order: [u8; 3],
    pub n_count: usize,
    pub n_scalars: usize,
    pub n_properties: usize,
}

/// Orientation codes of the voxel axes of `affine`
///
/// Each voxel axis is labelled with the world axis carrying its largest
/// absolute coefficient, `R`/`L`, `A`/`P` or `S`/`I` depending on the sign.
pub fn voxel_order(affine: &[f64; 16]) -> [u8; 3] {
    const CODES: [[u8; 2]; 3] = [[b'R', b'L'], [b'A', b'P'], [b'S', b'I']];
    let mut order = [0u8; 3];
    let mut used = [false; 3];
    for (col, code) in order.iter_mut().enumerate() {
        let mut row = 0;
        let mut best = -1.0;
        for r in 0..3 {
            let a = affine[r * 4 + col].abs();
            if !used[r] && a > best {
                best = a;
                row = r;
            }
        }
        used[row] = true;
        let negative = affine[row * 4 + col] < 0.0;
        *code = CODES[row][negative as usize];
    }
    order
}

fn checked_i16(value: usize, what: &str) -> Result<i16> {
    i16::try_from(value).map_err(|_| {
        TrackingError::trk(format!("{} {} exceeds TrackVis limit {}", what, value, i16::MAX))
    })
}

fn checked_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        TrackingError::trk(format!("{} {} exceeds TrackVis limit {}", what, value, i32::MAX))
    })
}

/// Encode streamlines (world space) as TrackVis v2 bytes
pub fn encode_trk(
    streamlines: &[Streamline],
    affine: &[f64; 16],
    dims: (usize, usize, usize),
) -> Result<Vec<u8>> {
    let inv = invert_affine(affine)?;
    let vs = voxel_sizes(affine);
    let dim = [
        checked_i16(dims.0, "Dimension")?,
        checked_i16(dims.1, "Dimension")?,
        checked_i16(dims.2, "Dimension")?,
    ];
    let n_count = checked_i32(streamlines.len(), "Streamline count")?;

    let mut header = [0u8; HEADER_SIZE];
    header[0..6].copy_from_slice(b"TRACK\0");

    for (i, &d) in dim.iter().enumerate() {
        let offset = 6 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }
    for (i, &v) in vs.iter().enumerate() {
        let offset = 12 + i * 4;
        header[offset..offset + 4].copy_from_slice(&(v as f32).to_le_bytes());
    }
    // vox_to_ras at 440
    for (i, &a) in affine.iter().enumerate() {
        let offset = 440 + i * 4;
        header[offset..offset + 4].copy_from_slice(&(a as f32).to_le_bytes());
    }
    header[948..951].copy_from_slice(&voxel_order(affine));
    header[988..992].copy_from_slice(&n_count.to_le_bytes());
    header[992..996].copy_from_slice(&2i32.to_le_bytes());
    header[996..1000].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    let n_points: usize = streamlines.iter().map(Vec::len).sum();
    let mut buffer = Vec::with_capacity(HEADER_SIZE + streamlines.len() * 4 + n_points * 12);
    buffer.write_all(&header)?;

    for s in streamlines {
        buffer.write_all(&checked_i32(s.len(), "Point count")?.to_le_bytes())?;
        for p in s {
            let v = apply_affine(&inv, p);
            for a in 0..3 {
                let voxmm = (v[a] + 0.5) * vs[a];
                buffer.write_all(&(voxmm as f32).to_le_bytes())?;
            }
        }
    }

    Ok(buffer)
}

fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

/// Decode TrackVis bytes, returning world-space streamlines
pub fn decode_trk(bytes: &[u8]) -> Result<(Vec<Streamline>, TrkHeader)> {
    if bytes.len() < HEADER_SIZE {
        return Err(TrackingError::trk(format!(
            "File too small ({} bytes, need at least {})",
            bytes.len(),
            HEADER_SIZE
        )));
    }
    if &bytes[0..5] != b"TRACK" {
        return Err(TrackingError::trk(format!(
            "Bad magic '{}'",
            String::from_utf8_lossy(&bytes[0..5])
        )));
    }
    let hdr_size = read_i32(bytes, 996);
    if hdr_size != HEADER_SIZE as i32 {
        return Err(TrackingError::trk(format!(
            "hdr_size={} (big-endian or corrupt file)",
            hdr_size
        )));
    }

    let dims = [read_i16(bytes, 6), read_i16(bytes, 8), read_i16(bytes, 10)];
    let voxel_size = [read_f32(bytes, 12), read_f32(bytes, 16), read_f32(bytes, 20)];
    let n_scalars = read_i16(bytes, 36).max(0) as usize;
    let n_properties = read_i16(bytes, 238).max(0) as usize;

    let mut vox_to_ras = [0.0f64; 16];
    for (i, v) in vox_to_ras.iter_mut().enumerate() {
        *v = read_f32(bytes, 440 + i * 4) as f64;
    }
    if vox_to_ras[15] == 0.0 {
        // Version 1 files carry no transform
        vox_to_ras = [
            voxel_size[0] as f64, 0.0, 0.0, 0.0,
            0.0, voxel_size[1] as f64, 0.0, 0.0,
            0.0, 0.0, voxel_size[2] as f64, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
    }
    let vs = [voxel_size[0] as f64, voxel_size[1] as f64, voxel_size[2] as f64];
    if vs.iter().any(|&v| v <= 0.0) {
        return Err(TrackingError::trk(format!("Invalid voxel size {:?}", voxel_size)));
    }

    let mut streamlines = Vec::new();
    let mut offset = HEADER_SIZE;
    let per_point = 3 + n_scalars;
    while offset < bytes.len() {
        if offset + 4 > bytes.len() {
            return Err(TrackingError::trk("Truncated streamline record"));
        }
        let n = read_i32(bytes, offset);
        if n < 0 {
            return Err(TrackingError::trk(format!("Negative point count {}", n)));
        }
        let n = n as usize;
        offset += 4;
        let record = (n * per_point + n_properties) * 4;
        if offset + record > bytes.len() {
            return Err(TrackingError::trk(format!(
                "Truncated streamline {}: need {} bytes, have {}",
                streamlines.len(),
                record,
                bytes.len() - offset
            )));
        }
        let mut s = Vec::with_capacity(n);
        for p in 0..n {
            let base = offset + p * per_point * 4;
            let mut vox = [0.0; 3];
            for a in 0..3 {
                vox[a] = read_f32(bytes, base + a * 4) as f64 / vs[a] - 0.5;
            }
            s.push(apply_affine(&vox_to_ras, &vox));
        }
        offset += record;
        streamlines.push(s);
    }

    let header = TrkHeader {
        dims,
        voxel_size,
        vox_to_ras,
        voxel_order: [bytes[948], bytes[949], bytes[950]],
        n_count: read_i32(bytes, 988).max(0) as usize,
        n_scalars,
        n_properties,
    };
    Ok((streamlines, header))
}

/// Write streamlines to a .trk file
pub fn save_trk(
    path: &Path,
    streamlines: &[Streamline],
    affine: &[f64; 16],
    dims: (usize, usize, usize),
) -> Result<()> {
    let bytes = encode_trk(streamlines, affine, dims)?;
    std::fs::write(path, &bytes)?;
    info!("Wrote {} streamlines to {}", streamlines.len(), path.display());
    Ok(())
}

/// Read a .trk file
pub fn load_trk(path: &Path) -> Result<(Vec<Streamline>, TrkHeader)> {
    let bytes = std::fs::read(path)?;
    decode_trk(&bytes)
}
