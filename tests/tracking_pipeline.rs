//! End-to-end tracking tests on synthetic fiber fields

mod common;

use common::{assert_streamlines_close, sh_crossing_field, sh_z_field, temp_path, tensor_field, x_cutoff_mask};
use tracto_core::chunking::partition_seeds;
use tracto_core::direction::DirectionKind;
use tracto_core::nifti_io::save_params_to_file;
use tracto_core::parallel::{Backend, Engine};
use tracto_core::seeds::SeedSpec;
use tracto_core::sphere::Sphere;
use tracto_core::streamline_io::{load_trk, save_trk, streamline_length};
use tracto_core::utils::affine::IDENTITY;
use tracto_core::{track, track_image, ParamsSource, TrackingError, TrackingInputs, TrackingParams};

fn inputs() -> TrackingInputs {
    TrackingInputs {
        sphere: Some(Sphere::icosphere(2)),
        ..Default::default()
    }
}

#[test]
fn test_serial_and_parallel_identical() {
    let image = tensor_field((8, 5, 4), 0, IDENTITY);
    let serial = TrackingParams {
        engine: Engine::Serial,
        ..Default::default()
    };
    let expected = track_image(&image, &inputs(), &serial).unwrap();
    // density 2 => 8 seeds per voxel, one streamline each
    assert_eq!(expected.len(), 8 * 5 * 4 * 8);

    for backend in [Backend::Rayon, Backend::Threads] {
        for n_chunks in [1, 3, 100, 10_000] {
            let params = TrackingParams {
                engine: Engine::Parallel,
                backend,
                n_chunks,
                n_jobs: 4,
                ..Default::default()
            };
            let got = track_image(&image, &inputs(), &params).unwrap();
            assert_eq!(got, expected, "backend={} n_chunks={}", backend, n_chunks);
        }
    }
}

#[test]
fn test_chunk_partition_matches_seed_order() {
    let seeds: Vec<[f64; 3]> = (0..1001).map(|i| [i as f64, 0.0, 0.0]).collect();
    let chunks = partition_seeds(&seeds, 100);
    assert_eq!(chunks.len(), 100);
    assert_eq!(chunks[99].len(), 10 + 1);
    let rebuilt: Vec<[f64; 3]> = chunks.concat();
    assert_eq!(rebuilt, seeds);
}

#[test]
fn test_stops_at_stop_mask_boundary() {
    let dims = (12, 3, 3);
    let image = tensor_field(dims, 0, IDENTITY);
    let inputs = TrackingInputs {
        stop_mask: Some(x_cutoff_mask(dims, 5)),
        ..inputs()
    };
    let params = TrackingParams {
        seeds: SeedSpec::Coordinates(vec![[2.0, 1.0, 1.0]]),
        ..Default::default()
    };
    let streamlines = track_image(&image, &inputs, &params).unwrap();
    assert_eq!(streamlines.len(), 1);

    let xs: Vec<f64> = streamlines[0].iter().map(|p| p[0]).collect();
    let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    // Interpolated map drops to 0 at x = 6, the endpoint is kept
    assert!((max_x - 6.0).abs() < 1e-9, "forward end at {}", max_x);
    // Backward half leaves the image after x = -0.5
    assert!((min_x + 0.5).abs() < 1e-9, "backward end at {}", min_x);
    assert!((streamline_length(&streamlines[0]) - 6.5).abs() < 1e-9);
}

#[test]
fn test_sh_model_tracks_along_z() {
    let image = sh_z_field((3, 3, 10));
    let params = TrackingParams {
        seeds: SeedSpec::Coordinates(vec![[1.0, 1.0, 4.0]]),
        engine: Engine::Serial,
        ..Default::default()
    };
    let streamlines = track(image.into(), &inputs(), &params).unwrap();
    assert_eq!(streamlines.len(), 1);
    let sl = &streamlines[0];
    assert!(sl.len() > 10);
    for p in sl {
        assert!((p[0] - 1.0).abs() < 1e-9 && (p[1] - 1.0).abs() < 1e-9, "left the z axis at {:?}", p);
    }
}

#[test]
fn test_affine_maps_seeds_and_streamlines() {
    let affine = [
        2.0, 0.0, 0.0, -10.0,
        0.0, 2.0, 0.0, 0.0,
        0.0, 0.0, 2.0, 5.0,
        0.0, 0.0, 0.0, 1.0,
    ];
    let image = tensor_field((6, 3, 3), 2, affine);
    let params = TrackingParams {
        seeds: SeedSpec::Density(1),
        engine: Engine::Serial,
        ..Default::default()
    };
    let streamlines = track_image(&image, &inputs(), &params).unwrap();
    assert_eq!(streamlines.len(), 6 * 3 * 3);
    for sl in &streamlines {
        // Fibers run along z in world space too
        let x0 = sl[0][0];
        assert!(sl.iter().all(|p| (p[0] - x0).abs() < 1e-9));
        let dz = sl[1][2] - sl[0][2];
        assert!((dz.abs() - 0.5).abs() < 1e-9, "step of {} mm", dz);
    }
}

#[test]
fn test_probabilistic_is_reproducible() {
    let image = tensor_field((6, 4, 4), 1, IDENTITY);
    let params = TrackingParams {
        directions: DirectionKind::Probabilistic,
        seeds: SeedSpec::Density(1),
        n_chunks: 5,
        n_jobs: 2,
        rng_seed: 42,
        ..Default::default()
    };
    let a = track_image(&image, &inputs(), &params).unwrap();
    let b = track_image(&image, &inputs(), &params).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 6 * 4 * 4);
}

#[test]
fn test_track_from_nifti_file() {
    let image = tensor_field((7, 4, 4), 0, IDENTITY);
    let path = temp_path("params.nii.gz");
    save_params_to_file(&path, &image).unwrap();

    let params = TrackingParams {
        seeds: SeedSpec::Density(1),
        engine: Engine::Serial,
        ..Default::default()
    };
    let from_file = track(ParamsSource::Path(path.clone()), &inputs(), &params).unwrap();
    let in_memory = track(image.into(), &inputs(), &params).unwrap();
    assert_streamlines_close(&from_file, &in_memory, 1e-6);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_trk_output_roundtrip() {
    let affine = [
        1.5, 0.0, 0.0, -4.0,
        0.0, 1.5, 0.0, -3.0,
        0.0, 0.0, 1.5, 2.0,
        0.0, 0.0, 0.0, 1.0,
    ];
    let image = tensor_field((6, 4, 3), 0, affine);
    let params = TrackingParams {
        seeds: SeedSpec::Density(1),
        ..Default::default()
    };
    let streamlines = track_image(&image, &inputs(), &params).unwrap();

    let path = temp_path("tracks.trk");
    save_trk(&path, &streamlines, &affine, image.spatial_dims()).unwrap();
    let (loaded, header) = load_trk(&path).unwrap();

    assert_eq!(header.n_count, streamlines.len());
    assert_eq!(header.dims, [6, 4, 3]);
    assert_streamlines_close(&loaded, &streamlines, 1e-4);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_unsupported_model_from_file() {
    let data = vec![0.5; 4 * 4 * 4 * 5];
    let image = tracto_core::ParamsImage::new(data, (4, 4, 4, 5), (1.0, 1.0, 1.0), IDENTITY).unwrap();
    let path = temp_path("five_features.nii");
    save_params_to_file(&path, &image).unwrap();

    let err = track(ParamsSource::Path(path.clone()), &inputs(), &TrackingParams::default()).unwrap_err();
    assert!(matches!(err, TrackingError::UnsupportedModel { n_features: 5 }), "{}", err);

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_empty_seed_mask_gives_no_streamlines() {
    let image = tensor_field((4, 4, 4), 0, IDENTITY);
    let inputs = TrackingInputs {
        seed_mask: Some(vec![0; 64]),
        ..inputs()
    };
    let streamlines = track_image(&image, &inputs, &TrackingParams::default()).unwrap();
    assert!(streamlines.is_empty());
}

/// Axis a straight streamline runs along, checking it stays on that axis
fn straight_axis(streamline: &[[f64; 3]], seed: [f64; 3]) -> usize {
    let last = streamline[streamline.len() - 1];
    let axis = (0..3)
        .max_by(|&a, &b| (last[a] - seed[a]).abs().total_cmp(&(last[b] - seed[b]).abs()))
        .unwrap();
    for p in streamline {
        for k in (0..3).filter(|&k| k != axis) {
            assert!((p[k] - seed[k]).abs() < 1e-9, "left axis {} at {:?}", axis, p);
        }
    }
    axis
}

#[test]
fn test_max_cross_limits_crossing_fibers() {
    let image = sh_crossing_field((7, 7, 7));
    let seed = [3.0, 3.0, 3.0];
    let params = TrackingParams {
        seeds: SeedSpec::Coordinates(vec![seed]),
        engine: Engine::Serial,
        ..Default::default()
    };

    // One streamline per fiber population
    let both = track_image(&image, &inputs(), &params).unwrap();
    assert_eq!(both.len(), 2);
    let mut axes: Vec<usize> = both.iter().map(|sl| straight_axis(sl, seed)).collect();
    axes.sort_unstable();
    assert_eq!(axes, vec![0, 2]);
    for sl in &both {
        assert!(streamline_length(sl) > 6.0);
    }

    let single = TrackingParams { max_cross: Some(1), ..params };
    let one = track_image(&image, &inputs(), &single).unwrap();
    assert_eq!(one.len(), 1);
    assert!(both.contains(&one[0]));
}
