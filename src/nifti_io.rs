//! NIfTI file I/O
//!
//! Loads parameter volumes and masks from .nii / .nii.gz bytes or files, and
//! writes float32 NIfTI-1 volumes (3D maps or 4D parameter volumes).

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{Result, TrackingError};
use crate::model::ParamsImage;
use crate::utils::mask::binarize;

/// 3D NIfTI volume
pub struct NiftiData {
    /// Volume data as f64, Fortran order
    pub data: Vec<f64>,
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
    pub scl_slope: f64,
    pub scl_inter: f64,
}

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header summary for error messages
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("File too small ({} bytes, need at least 348)", bytes.len());
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn open_nifti(bytes: &[u8]) -> Result<InMemNiftiObject> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = match std::io::Read::read_to_end(&mut GzDecoder::new(Cursor::new(bytes)), &mut decompressed) {
                Ok(_) => get_header_info(&decompressed),
                Err(_) => "could not decompress".to_string(),
            };
            TrackingError::nifti(format!("Failed to read gzipped NIfTI: {} ({})", e, info))
        })
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| TrackingError::nifti(format!("Failed to read NIfTI: {} ({})", e, get_header_info(bytes))))
    }
}

/// Decoded volume: data with the feature axis slowest, shape, voxel size, affine
type Volume4d = (Vec<f64>, (usize, usize, usize, usize), (f64, f64, f64), [f64; 16]);

fn decode_volume(obj: InMemNiftiObject, first_only: bool) -> Result<Volume4d> {
    let header = obj.header();
    if (header.dim[0] as usize) < 3 {
        return Err(TrackingError::nifti(format!(
            "Expected at least 3D volume, got {}D",
            header.dim[0]
        )));
    }
    let voxel_size = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );
    let affine = get_affine(header);

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| TrackingError::nifti(format!("Failed to convert to ndarray: {}", e)))?;
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(TrackingError::nifti(format!("Expected at least 3D array, got {}D", shape.len())));
    }
    if shape.len() > 4 && shape[4..].iter().any(|&s| s > 1) {
        return Err(TrackingError::nifti(format!("Volumes above 4D are not supported (shape {:?})", shape)));
    }

    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 && !first_only { shape[3] } else { 1 };

    // index = x + y*nx + z*nx*ny + t*nx*ny*nz
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    let mut index = vec![0usize; shape.len()];
    for t in 0..nt {
        if shape.len() >= 4 {
            index[3] = t;
        }
        for k in 0..nz {
            index[2] = k;
            for j in 0..ny {
                index[1] = j;
                for i in 0..nx {
                    index[0] = i;
                    data.push(array[IxDyn(&index)]);
                }
            }
        }
    }
    Ok((data, (nx, ny, nz, nt), voxel_size, affine))
}

/// Load a 3D NIfTI volume from bytes (first volume of a 4D file)
///
/// Supports both .nii and .nii.gz (gzip is auto-detected).
pub fn load_nifti(bytes: &[u8]) -> Result<NiftiData> {
    let obj = open_nifti(bytes)?;
    let scl_slope = if obj.header().scl_slope == 0.0 { 1.0 } else { obj.header().scl_slope as f64 };
    let scl_inter = obj.header().scl_inter as f64;
    let (data, (nx, ny, nz, _), voxel_size, affine) = decode_volume(obj, true)?;
    Ok(NiftiData {
        data,
        dims: (nx, ny, nz),
        voxel_size,
        affine,
        scl_slope,
        scl_inter,
    })
}

/// Load a full 4D parameter volume from bytes
///
/// A 3D file is read as a volume with a single feature.
pub fn load_nifti_4d(bytes: &[u8]) -> Result<ParamsImage> {
    let obj = open_nifti(bytes)?;
    let (data, dims, voxel_size, affine) = decode_volume(obj, false)?;
    debug!("Loaded parameter volume {:?}", dims);
    ParamsImage::new(data, dims, voxel_size, affine)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Encode a float32 NIfTI-1 single file; `nt == 1` writes a 3D header
fn encode_nifti(
    data: &[f64],
    dims: (usize, usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>> {
    let (nx, ny, nz, nt) = dims;
    if data.len() != nx * ny * nz * nt {
        return Err(TrackingError::shape_mismatch("NIfTI data", &[nx, ny, nz, nt], &[data.len()]));
    }
    if [nx, ny, nz, nt].iter().any(|&d| d > i16::MAX as usize) {
        return Err(TrackingError::nifti(format!("Dimensions {:?} exceed the NIfTI-1 limit", dims)));
    }
    let (vsx, vsy, vsz) = voxel_size;

    let mut header = [0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let ndim = if nt > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(352 + data.len() * 4);
    buffer.write_all(&header)?;
    buffer.write_all(&[0u8; 4])?;
    for &val in data {
        buffer.write_all(&(val as f32).to_le_bytes())?;
    }
    Ok(buffer)
}

/// Save a 3D volume as uncompressed NIfTI bytes
pub fn save_nifti(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>> {
    encode_nifti(data, (dims.0, dims.1, dims.2, 1), voxel_size, affine)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Save a 3D volume as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<Vec<u8>> {
    gzip(&save_nifti(data, dims, voxel_size, affine)?)
}

fn write_maybe_gz(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        gzip(&bytes)?
    } else {
        bytes
    };
    std::fs::write(path, &bytes)?;
    Ok(())
}

/// Read a 3D NIfTI file (.nii or .nii.gz)
pub fn read_nifti_file(path: &Path) -> Result<NiftiData> {
    let bytes = std::fs::read(path)?;
    load_nifti(&bytes)
}

/// Read a 4D parameter volume file (.nii or .nii.gz)
pub fn read_params_file(path: &Path) -> Result<ParamsImage> {
    let bytes = std::fs::read(path)?;
    load_nifti_4d(&bytes)
}

/// Read a mask file: voxels with value > 0 are set
pub fn read_mask_file(path: &Path) -> Result<(Vec<u8>, (usize, usize, usize))> {
    let nii = read_nifti_file(path)?;
    Ok((binarize(&nii.data, 0.0), nii.dims))
}

/// Save a 3D volume; `.nii.gz` paths are gzip compressed
pub fn save_nifti_to_file(
    path: &Path,
    data: &[f64],
    dims: (usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
) -> Result<()> {
    write_maybe_gz(path, save_nifti(data, dims, voxel_size, affine)?)
}

/// Save a 4D parameter volume; `.nii.gz` paths are gzip compressed
pub fn save_params_to_file(path: &Path, params: &ParamsImage) -> Result<()> {
    let bytes = encode_nifti(&params.data, params.dims, params.voxel_size, &params.affine)?;
    write_maybe_gz(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::affine::IDENTITY;

    #[test]
    fn test_affine_identity() {
        let mut header = NiftiHeader::default();
        header.pixdim[1] = 1.0;
        header.pixdim[2] = 2.0;
        header.pixdim[3] = 3.0;
        header.sform_code = 0;

        let affine = get_affine(&header);
        assert_eq!(affine[0], 1.0);
        assert_eq!(affine[5], 2.0);
        assert_eq!(affine[10], 3.0);
    }

    #[test]
    fn test_affine_sform() {
        let mut header = NiftiHeader::default();
        header.sform_code = 1;
        header.srow_x = [1.0, 0.0, 0.0, 10.0];
        header.srow_y = [0.0, 2.0, 0.0, 20.0];
        header.srow_z = [0.0, 0.0, 3.0, 30.0];

        let affine = get_affine(&header);
        assert_eq!(affine[3], 10.0);
        assert_eq!(affine[7], 20.0);
        assert_eq!(affine[11], 30.0);
        assert_eq!(affine[15], 1.0);
    }

    #[test]
    fn test_gzip_detection() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x00]));
        assert!(!is_gzip(&[0x00, 0x00, 0x00]));
        assert!(!is_gzip(&[0x1f]));
    }

    #[test]
    fn test_save_nifti_header_details() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let affine = [
            1.5, 0.0, 0.0, 5.0,
            0.0, 2.5, 0.0, 10.0,
            0.0, 0.0, 3.5, 15.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let bytes = save_nifti(&data, (2, 2, 2), (1.5, 2.5, 3.5), &affine).unwrap();

        assert_eq!(bytes.len(), 352 + 8 * 4);
        assert_eq!(&bytes[344..348], b"n+1\0");
        assert_eq!(i16::from_le_bytes([bytes[40], bytes[41]]), 3);
        assert_eq!(i16::from_le_bytes([bytes[70], bytes[71]]), 16);
        let srow_y3 = f32::from_le_bytes([bytes[308], bytes[309], bytes[310], bytes[311]]);
        assert_eq!(srow_y3, 10.0);
    }

    #[test]
    fn test_save_nifti_rejects_wrong_length() {
        let err = save_nifti(&[0.0; 7], (2, 2, 2), (1.0, 1.0, 1.0), &IDENTITY);
        assert!(matches!(err, Err(TrackingError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_save_and_read_nifti_roundtrip() {
        let dims = (4, 3, 2);
        let n = dims.0 * dims.1 * dims.2;
        let affine = [
            1.0, 0.1, 0.2, 10.0,
            0.3, 2.0, 0.4, 20.0,
            0.5, 0.6, 3.0, 30.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        let data: Vec<f64> = (0..n).map(|i| (i as f64) * 0.5 + 1.0).collect();

        let tmp_path = std::env::temp_dir().join("tracto_nifti_roundtrip.nii");
        save_nifti_to_file(&tmp_path, &data, dims, (1.0, 2.0, 3.0), &affine).unwrap();
        let loaded = read_nifti_file(&tmp_path).unwrap();

        assert_eq!(loaded.dims, dims);
        assert!((loaded.voxel_size.1 - 2.0).abs() < 1e-5);
        for i in 0..n {
            assert!(
                (loaded.data[i] - data[i]).abs() < 1e-5,
                "Data mismatch at index {}: expected {}, got {}",
                i, data[i], loaded.data[i]
            );
        }
        for i in 0..16 {
            assert!((loaded.affine[i] - affine[i]).abs() < 1e-5, "Affine[{}] mismatch", i);
        }
        assert!((loaded.scl_slope - 1.0).abs() < 1e-5);

        std::fs::remove_file(&tmp_path).ok();
    }

    #[test]
    fn test_params_roundtrip_gz() {
        let dims = (3, 2, 2, 5);
        let n = dims.0 * dims.1 * dims.2 * dims.3;
        let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let params = ParamsImage::new(data.clone(), dims, (2.0, 2.0, 2.0), IDENTITY).unwrap();

        let tmp_path = std::env::temp_dir().join("tracto_params_roundtrip.nii.gz");
        save_params_to_file(&tmp_path, &params).unwrap();
        let bytes = std::fs::read(&tmp_path).unwrap();
        assert!(is_gzip(&bytes), "File should be gzip compressed");

        let loaded = read_params_file(&tmp_path).unwrap();
        assert_eq!(loaded.dims, dims);
        assert_eq!(loaded.data, data);
        // 3D reader takes the first volume only
        let first = load_nifti(&bytes).unwrap();
        assert_eq!(first.data, data[..12].to_vec());

        std::fs::remove_file(&tmp_path).ok();
    }

    #[test]
    fn test_3d_file_as_params() {
        let bytes = save_nifti_gz(&[1.0; 8], (2, 2, 2), (1.0, 1.0, 1.0), &IDENTITY).unwrap();
        let params = load_nifti_4d(&bytes).unwrap();
        assert_eq!(params.dims, (2, 2, 2, 1));
    }

    #[test]
    fn test_read_mask_file() {
        let data = vec![0.0, 0.5, -1.0, 2.0, 0.0, 0.0, 1.0, 0.0];
        let tmp_path = std::env::temp_dir().join("tracto_mask.nii");
        save_nifti_to_file(&tmp_path, &data, (2, 2, 2), (1.0, 1.0, 1.0), &IDENTITY).unwrap();
        let (mask, dims) = read_mask_file(&tmp_path).unwrap();
        assert_eq!(dims, (2, 2, 2));
        assert_eq!(mask, vec![0, 1, 0, 1, 0, 0, 1, 0]);
        std::fs::remove_file(&tmp_path).ok();
    }

    #[test]
    fn test_load_nifti_invalid_bytes() {
        assert!(matches!(load_nifti(&[0u8; 10]), Err(TrackingError::Nifti(_))));
        assert!(load_nifti(&[0x1f, 0x8b, 0x00, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_get_header_info() {
        assert!(get_header_info(&[0u8; 10]).contains("too small"));

        let mut bytes = vec![0u8; 348];
        bytes[0..4].copy_from_slice(&348i32.to_le_bytes());
        bytes[344..348].copy_from_slice(b"n+1\0");
        bytes[70..72].copy_from_slice(&16i16.to_le_bytes());
        let info = get_header_info(&bytes);
        assert!(info.contains("sizeof_hdr=348"));
        assert!(info.contains("datatype=16"));
    }

    #[test]
    fn test_read_nonexistent_file() {
        let result = read_nifti_file(Path::new("/tmp/tracto_nonexistent_12345.nii"));
        assert!(matches!(result, Err(TrackingError::Io(_))));
    }
}
