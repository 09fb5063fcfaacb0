//! Concrete scenario tests, one per numbered case in the spec's
//! "testable properties" section: small synthetic images with a known
//! expected detection count or shape.

use skysieve::prelude::*;

fn config(opening_connectivity: Connectivity, min_area: usize) -> Config {
    Config::new(
        2,
        2,
        Connectivity::Eight,
        1,
        opening_connectivity,
        -2.0,
        min_area,
        0.99,
        0,
        false,
        true,
        1.0,
        2,
        smallvec::smallvec![32, 32],
        smallvec::smallvec![8, 8],
    )
    .unwrap()
}

fn noisy_sky(rng: &mut impl rand::Rng, width: usize, height: usize) -> Vec<f32> {
    (0..width * height).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
}

fn run_on(image: &Image, cfg: &Config) -> DetectionOutput<'static, ()> {
    let tile_grid = TileGrid::new(image.shape().clone(), cfg.fine_tile_shape.clone());
    let initial_quantiles = PerTileQuantiles { values: vec![3.0; tile_grid.total_tiles()] };

    run::<()>(
        cfg,
        image,
        None,
        &initial_quantiles,
        None,
        &ReferenceThresholder,
        &SigmaClippedSkyStdEstimator::default(),
        &mut NullObserver,
    )
    .expect("scenario pipeline should complete")
}

#[test]
fn scenario_two_touching_diagonal_blocks_connectivity_dependence() {
    let mut rng = rand::rng();
    let mut data = noisy_sky(&mut rng, 64, 64);

    // two 5x5 blocks touching only at the corner (20, 20)
    for y in 15..20 {
        for x in 15..20 {
            data[y * 64 + x] = 20.0;
        }
    }
    for y in 20..25 {
        for x in 20..25 {
            data[y * 64 + x] = 20.0;
        }
    }

    let image = Image::from_data(smallvec::smallvec![64, 64], data);

    let four_connected = run_on(&image, &config(Connectivity::Four, 5));
    assert_eq!(four_connected.num_detections, 2);

    let eight_connected = run_on(&image, &config(Connectivity::Eight, 5));
    assert_eq!(eight_connected.num_detections, 1);
}

#[test]
fn scenario_below_threshold_noise_peak_is_not_detected() {
    let mut rng = rand::rng();
    let mut data = noisy_sky(&mut rng, 64, 64);

    // a faint 3x3 bump, too small/faint to clear detsn_min_area = 10
    for y in 30..33 {
        for x in 30..33 {
            data[y * 64 + x] = 2.0;
        }
    }

    let image = Image::from_data(smallvec::smallvec![64, 64], data);
    let output = run_on(&image, &config(Connectivity::Eight, 10));

    assert_eq!(output.num_detections, 0);
}

#[test]
fn scenario_holes_are_filled_in_the_final_detection() {
    let mut rng = rand::rng();
    let mut data = noisy_sky(&mut rng, 64, 64);

    // a bright annulus: outer radius 15, inner radius 5, centered at (32, 32)
    let (cy, cx) = (32.0f64, 32.0f64);
    for y in 0..64 {
        for x in 0..64 {
            let dy = y as f64 - cy;
            let dx = x as f64 - cx;
            let r = (dy * dy + dx * dx).sqrt();
            if r <= 15.0 && r >= 5.0 {
                data[y * 64 + x] = 20.0;
            }
        }
    }

    let image = Image::from_data(smallvec::smallvec![64, 64], data);
    let output = run_on(&image, &config(Connectivity::Eight, 10));

    assert_eq!(output.num_detections, 1);

    // the filled disk should be solidly 1 well inside the outer radius,
    // including at the center, which was background in the source image.
    let center_linear = 32 * 64 + 32;
    assert_eq!(output.final_binary.as_slice()[center_linear], 1);
}

#[test]
fn scenario_all_sky_image_yields_no_detections() {
    let mut rng = rand::rng();
    let data = noisy_sky(&mut rng, 64, 64);
    let image = Image::from_data(smallvec::smallvec![64, 64], data);

    let output = run_on(&image, &config(Connectivity::Eight, 5));

    assert_eq!(output.num_detections, 0);
    assert!(output.sn_threshold.is_finite());
}
