//! `DetectionPipeline` (spec §4.6): the orchestrator sequencing
//! Initial Detection → Sky/Std Estimation → Pseudo-Detection
//! Calibration (sky-side then detection-side) → False-Detection
//! Culling → optional Dilation → optional Final S/N Culling.
//!
//! Modeled as a single free function rather than a long-lived object
//! with a state field: the state machine in spec §4.6 is strictly
//! forward and single-shot, so there is nothing a caller could usefully
//! do between transitions — the teacher's own one-shot entry points
//! (e.g. `read()`/`write()` in `lib.rs`) are likewise plain functions,
//! not resumable objects.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::grid::{Binary, Connectivity, Image, Labels, BLANK_I32, BLANK_U8};
use crate::label::label_connected_components;
use crate::math::quantile;
use crate::morph::{dilate, erode, fill_holes, open};
use crate::observer::{CheckImage, Observer, Snapshot};
use crate::pseudo_sn::{PseudoSN, Role};
use crate::reference::SkyStdEstimator;
use crate::threshold::{PerTileQuantiles, QuantileThresholder};
use crate::tile::{TileEngine, TileGrid};

/// The pipeline's outputs on success (spec §6 "Outputs").
pub struct DetectionOutput<'a, W> {
    pub final_binary: Binary,
    pub final_labels: Labels,
    pub num_detections: usize,
    pub sn_threshold: f32,
    /// Opaque coordinate metadata, passed through untouched.
    pub wcs: Option<&'a W>,
}

/// Runs the full detection pipeline to completion.
///
/// `initial_quantiles` and `no_erode_quantiles` are the per-tile
/// quantile-on-image values for the THRESHOLDED transition (step 1);
/// spec §4.4 treats the Thresholder as contract-only, so the actual
/// quantile *values* — like the `SkyStdEstimator`'s output — are
/// produced upstream of this core.
#[allow(clippy::too_many_arguments)]
pub fn run<'a, W>(
    config: &Config,
    image: &Image,
    wcs: Option<&'a W>,
    initial_quantiles: &PerTileQuantiles,
    no_erode_quantiles: Option<&PerTileQuantiles>,
    thresholder: &impl QuantileThresholder,
    sky_std_estimator: &impl SkyStdEstimator,
    observer: &mut impl Observer,
) -> Result<DetectionOutput<'a, W>> {
    let ndim = image.ndim();
    if config.large_tile_shape.len() != ndim || config.fine_tile_shape.len() != ndim {
        return Err(Error::shape_mismatch(format!(
            "configured tile shapes have rank {} but the image has rank {}",
            config.large_tile_shape.len(),
            ndim
        )));
    }

    let fine_tile_grid = TileGrid::new(image.shape().clone(), config.fine_tile_shape.clone());
    let large_tile_grid = TileGrid::new(image.shape().clone(), config.large_tile_shape.clone());
    let tile_engine = TileEngine::new(config.num_threads)?;

    // 1. START -> THRESHOLDED
    let mut binary = image.blank_seeded_binary(0);
    thresholder.apply(image, &fine_tile_grid, initial_quantiles, no_erode_quantiles, &mut binary)?;
    observer.on_snapshot(Snapshot { tag: CheckImage::Thresholded, binary: Some(&binary), labels: None });

    // 2. THRESHOLDED -> ERODED
    erode(&mut binary, config.erode_times, config.erode_connectivity);
    for value in binary.as_mut_slice().iter_mut() {
        if *value == crate::grid::NO_ERODE {
            *value = 1;
        }
    }
    observer.on_snapshot(Snapshot { tag: CheckImage::Eroded, binary: Some(&binary), labels: None });

    // 3. ERODED -> OPENED
    open(&mut binary, config.opening_depth, config.opening_connectivity);

    // 4. OPENED -> INITIAL-LABELED
    let (initial_labels, _num_initial) = label_connected_components(&binary, config.opening_connectivity);
    observer.on_snapshot(Snapshot {
        tag: CheckImage::OpenedAndLabeled,
        binary: Some(&binary),
        labels: Some(&initial_labels),
    });

    // 5. INITIAL-LABELED -> SKY-STD-READY
    let (sky_map, std_map) = sky_std_estimator.estimate(image, &binary, &fine_tile_grid)?;

    // 6. SKY-STD-READY -> PSEUDO-THRESHOLDED
    let sigma_quantiles = PerTileQuantiles {
        values: sky_map
            .values
            .iter()
            .zip(std_map.values.iter())
            .map(|(&sky, &std)| sky + config.dthresh * std)
            .collect(),
    };
    let mut pseudo_threshold_binary = image.blank_seeded_binary(0);
    thresholder.apply(image, &fine_tile_grid, &sigma_quantiles, None, &mut pseudo_threshold_binary)?;

    let pseudo_sn = PseudoSN {
        min_area: config.detsn_min_area,
        cpscorr: config.cpscorr,
        sky_subtracted: config.sky_subtracted,
    };

    // 7. PSEUDO-THRESHOLDED -> SKY-CALIBRATED
    let (sky_workbin, sky_labels, sky_count) = pseudo_sn.build_pseudo_labels(
        &pseudo_threshold_binary,
        &initial_labels,
        &large_tile_grid,
        &tile_engine,
        Role::Sky,
        config.blank_counts_as_sky_detection,
    );
    observer.on_snapshot(Snapshot { tag: CheckImage::DthreshOnSky, binary: Some(&sky_workbin), labels: None });
    observer.on_snapshot(Snapshot { tag: CheckImage::PseudosForSn, binary: None, labels: Some(&sky_labels) });

    let sky_sn_table =
        pseudo_sn.accumulate_and_compute(image, &sky_labels, sky_count, &initial_labels, &fine_tile_grid, &sky_map, &std_map, Role::Sky)?;
    let sn_threshold =
        quantile(&sky_sn_table.values, config.detquant).expect("non-empty by accumulate_and_compute's own guard");

    // 8. SKY-CALIBRATED -> DET-CALIBRATED
    let (det_workbin, det_labels, det_count) = pseudo_sn.build_pseudo_labels(
        &pseudo_threshold_binary,
        &initial_labels,
        &large_tile_grid,
        &tile_engine,
        Role::Det,
        config.blank_counts_as_sky_detection,
    );
    observer.on_snapshot(Snapshot { tag: CheckImage::DthreshOnDet, binary: Some(&det_workbin), labels: None });
    observer.on_snapshot(Snapshot { tag: CheckImage::TruePseudos, binary: None, labels: Some(&det_labels) });

    let det_sn_table =
        pseudo_sn.accumulate_and_compute(image, &det_labels, det_count, &initial_labels, &fine_tile_grid, &sky_map, &std_map, Role::Det)?;

    let mut culled_binary = Binary::filled(binary.shape().clone(), 0);
    for linear in 0..det_labels.size() {
        let label = det_labels.as_slice()[linear];
        if label == BLANK_I32 {
            culled_binary.as_mut_slice()[linear] = BLANK_U8;
            continue;
        }
        let keep = label > 0 && det_sn_table.values[label as usize] > sn_threshold;
        culled_binary.as_mut_slice()[linear] = if keep { 1 } else { 0 };
    }

    // 9. DET-CALIBRATED -> FALSE-CULLED
    let mut surviving_initial_ids = std::collections::HashSet::new();
    for linear in 0..initial_labels.size() {
        let initial_label = initial_labels.as_slice()[linear];
        if initial_label > 0 && culled_binary.as_slice()[linear] == 1 {
            surviving_initial_ids.insert(initial_label);
        }
    }

    let (_, mut current_binary) = compact_relabel(&initial_labels, |label| surviving_initial_ids.contains(&label));

    // whole-image hole fill on the surviving detection binary, then
    // relabel: the per-tile fill in PseudoSN's `fill_then_open` only
    // closes holes within a single large tile, so a detection whose
    // enclosed background spans a tile boundary (or simply was never
    // part of a pseudo-detection pass) still needs this image-level pass.
    fill_holes(&mut current_binary);
    let (mut current_labels, mut num_current) = label_connected_components(&current_binary, config.opening_connectivity);
    observer.on_snapshot(Snapshot { tag: CheckImage::HolesFilled, binary: Some(&current_binary), labels: None });
    observer.on_snapshot(Snapshot {
        tag: CheckImage::DetectionFinal,
        binary: Some(&current_binary),
        labels: Some(&current_labels),
    });

    // 10. -> DILATED (optional)
    if config.dilate > 0 {
        let maximal = Connectivity::maximal_for_ndim(ndim);
        dilate(&mut current_binary, config.dilate, maximal);
        let (dilated_labels, dilated_count) = label_connected_components(&current_binary, maximal);
        current_labels = dilated_labels;
        num_current = dilated_count;
        observer.on_snapshot(Snapshot { tag: CheckImage::Dilated, binary: Some(&current_binary), labels: Some(&current_labels) });
    }

    // 11. -> FINAL-SN-CULLED (optional)
    if config.clean_dilated {
        let final_sn_table =
            pseudo_sn.accumulate_and_compute(image, &current_labels, num_current, &current_labels, &fine_tile_grid, &sky_map, &std_map, Role::Final)?;

        let (culled_labels, culled_final_binary) =
            compact_relabel(&current_labels, |label| final_sn_table.values[label as usize] > sn_threshold);
        current_labels = culled_labels;
        current_binary = culled_final_binary;
        num_current = current_labels.as_slice().iter().filter(|&&l| l > 0).collect::<std::collections::HashSet<_>>().len();
    }

    // 12. -> DONE
    Ok(DetectionOutput {
        final_binary: current_binary,
        final_labels: current_labels,
        num_detections: num_current,
        sn_threshold,
        wcs,
    })
}

/// Builds a fresh `Labels` grid from `source`, keeping only the labels
/// for which `keep(label)` is true and renumbering survivors
/// `1..=M` in ascending original-label order (spec P5/step 9 "compact-
/// renumbered"). Also returns the matching `Binary` (`1` on surviving
/// pixels, `0` elsewhere, blanks preserved).
fn compact_relabel(source: &Labels, keep: impl Fn(i32) -> bool) -> (Labels, Binary) {
    let mut remap: std::collections::HashMap<i32, i32> = std::collections::HashMap::new();
    let mut next = 1i32;
    let mut label_data = vec![0i32; source.size()];
    let mut binary_data = vec![0u8; source.size()];

    for linear in 0..source.size() {
        let label = source.as_slice()[linear];
        if label == BLANK_I32 {
            label_data[linear] = BLANK_I32;
            binary_data[linear] = BLANK_U8;
            continue;
        }
        if label <= 0 || !keep(label) {
            continue;
        }

        let new_label = *remap.entry(label).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        label_data[linear] = new_label;
        binary_data[linear] = 1;
    }

    (Labels::from_data(source.shape().clone(), label_data), Binary::from_data(source.shape().clone(), binary_data))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::Grid;
    use crate::observer::NullObserver;
    use crate::reference::SigmaClippedSkyStdEstimator;
    use crate::threshold::ReferenceThresholder;
    use rand::Rng;

    fn make_config() -> Config {
        Config::new(
            2,
            2,
            Connectivity::Eight,
            1,
            Connectivity::Eight,
            -2.0,
            5,
            0.99,
            1,
            false,
            true,
            1.0,
            2,
            smallvec::smallvec![32, 32],
            smallvec::smallvec![8, 8],
        )
        .unwrap()
    }

    fn noisy_sky(width: usize, height: usize) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..width * height).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect()
    }

    #[test]
    fn all_sky_image_detects_nothing() {
        let config = make_config();
        let image = Image::from_data(smallvec::smallvec![64, 64], noisy_sky(64, 64));
        let tile_grid = TileGrid::new(smallvec::smallvec![64, 64], config.fine_tile_shape.clone());
        let initial_quantiles = PerTileQuantiles { values: vec![3.0; tile_grid.total_tiles()] };

        let result = run::<()>(
            &config,
            &image,
            None,
            &initial_quantiles,
            None,
            &ReferenceThresholder,
            &SigmaClippedSkyStdEstimator::default(),
            &mut NullObserver,
        );

        let output = result.expect("an all-sky image should still calibrate successfully");
        assert_eq!(output.num_detections, 0);
        assert!(output.sn_threshold.is_finite());
    }

    #[test]
    fn bright_block_is_detected() {
        let config = make_config();
        let mut data = noisy_sky(64, 64);
        for y in 27..37 {
            for x in 27..37 {
                data[y * 64 + x] = 20.0;
            }
        }
        let image = Image::from_data(smallvec::smallvec![64, 64], data);
        let tile_grid = TileGrid::new(smallvec::smallvec![64, 64], config.fine_tile_shape.clone());
        let initial_quantiles = PerTileQuantiles { values: vec![3.0; tile_grid.total_tiles()] };

        let output = run::<()>(
            &config,
            &image,
            None,
            &initial_quantiles,
            None,
            &ReferenceThresholder,
            &SigmaClippedSkyStdEstimator::default(),
            &mut NullObserver,
        )
        .expect("bright block should calibrate");

        assert_eq!(output.num_detections, 1);
    }

    #[test]
    fn blank_stripe_is_preserved_end_to_end() {
        let config = make_config();
        let mut data = noisy_sky(64, 64);
        for y in 30..34 {
            for x in 0..64 {
                data[y * 64 + x] = f32::NAN;
            }
        }
        for y in 10..15 {
            for x in 10..15 {
                data[y * 64 + x] = 20.0;
            }
        }
        let image = Image::from_data(smallvec::smallvec![64, 64], data);
        let tile_grid = TileGrid::new(smallvec::smallvec![64, 64], config.fine_tile_shape.clone());
        let initial_quantiles = PerTileQuantiles { values: vec![3.0; tile_grid.total_tiles()] };

        let output = run::<()>(
            &config,
            &image,
            None,
            &initial_quantiles,
            None,
            &ReferenceThresholder,
            &SigmaClippedSkyStdEstimator::default(),
            &mut NullObserver,
        )
        .expect("blank stripe should not prevent calibration");

        for x in 0..64 {
            let linear = 31 * 64 + x;
            assert_eq!(output.final_binary.as_slice()[linear], BLANK_U8);
            assert_eq!(output.final_labels.as_slice()[linear], BLANK_I32);
        }
    }

    #[test]
    fn compact_relabel_drops_non_survivors_and_renumbers() {
        let source = Labels::from_data(smallvec::smallvec![1, 5], vec![1, 2, 2, 3, BLANK_I32]);
        let (labels, binary) = compact_relabel(&source, |label| label != 2);

        assert_eq!(labels.as_slice(), &[1, 0, 0, 2, BLANK_I32]);
        assert_eq!(binary.as_slice(), &[1, 0, 0, 1, BLANK_U8]);
    }
}
