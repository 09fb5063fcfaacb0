//! `PseudoSN` (spec §4.5): builds a pseudo-detection labeling and, for
//! each pseudo-detection, its signal-to-noise ratio against a per-tile
//! sky/noise reference.
//!
//! Grounded in `original_source/bin/noisechisel/detection.c`'s
//! `detection_pseudo_find` (stages A-C, the pseudo-labeling build) and
//! `detection_sn` (stages D-E, shared across all three roles — the
//! same accumulation code computes the S/N table whether it is run on
//! a freshly built pseudo-labeling or directly on the final labels).

use crate::error::{Error, Result};
use crate::grid::{Binary, Connectivity, Image, Labels, BLANK_I32, BLANK_U8};
use crate::label::label_connected_components;
use crate::math::Axes;
use crate::morph::{fill_holes, open};
use crate::reference::{SkyMap, StdMap};
use crate::tile::{TileEngine, TileGrid};

/// Which side of the pipeline a `PseudoSN` pass is calibrating.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Role {
    /// Pseudo-detections built over the candidate-sky region. Used to
    /// derive `sn_threshold`.
    Sky,
    /// Pseudo-detections built over the initial-detection region.
    /// Culled against the sky-derived `sn_threshold`.
    Det,
    /// The final, post-dilation labels. S/N is computed directly on
    /// them — no pseudo-labeling build, stages A-C are skipped.
    Final,
}

/// Per-label S/N values produced by a `PseudoSN` pass.
///
/// For `Role::Det`/`Role::Final`, `values[label]` holds `SN_label`
/// (index 0 is unused/`NaN`) — spec §4.5 "ordering guarantees". For
/// `Role::Sky`, `values` is a compact list of finite S/N values in
/// ascending label order, with disqualified/ineligible labels dropped.
#[derive(Debug, Clone)]
pub struct SNTable {
    pub values: Vec<f32>,
    pub role: Role,
}

/// Minimum pseudo-detection area for it to be eligible for an S/N
/// value (spec §4.5 Stage E guard, surfaced as `detsn_min_area`).
pub struct PseudoSN {
    pub min_area: usize,
    pub cpscorr: f32,
    pub sky_subtracted: bool,
}

impl PseudoSN {
    /// Stages A-C: builds the pseudo-labeling for `role ∈ {Sky, Det}`.
    /// Returns the fresh pseudo-`Binary`/`Labels` pair and pseudo count.
    pub fn build_pseudo_labels(
        &self,
        threshold_binary: &Binary,
        initial_labels: &Labels,
        large_tile_grid: &TileGrid,
        tile_engine: &TileEngine,
        role: Role,
        blank_counts_as_sky_detection: bool,
    ) -> (Binary, Labels, usize) {
        debug_assert!(role != Role::Final, "Final role has no pseudo-labeling build");

        let mut workbin = prepare(threshold_binary, initial_labels, role, blank_counts_as_sky_detection);
        fill_then_open(&mut workbin, large_tile_grid, tile_engine);

        let orthogonal = match workbin.ndim() {
            2 => Connectivity::Four,
            3 => Connectivity::Six,
            _ => unreachable!("grids are only ever 2- or 3-dimensional"),
        };
        let (labels, count) = label_connected_components(&workbin, orthogonal);

        (workbin, labels, count)
    }

    /// Stages D-E: accumulates per-label area/brightness/centroid and
    /// computes S/N. Shared across all three roles.
    ///
    /// `initial_labels` is only consulted when `role == Role::Sky`
    /// (for the overlap-disqualification rule); pass any labels grid
    /// of the right shape otherwise.
    pub fn accumulate_and_compute(
        &self,
        image: &Image,
        worklab: &Labels,
        num_labels: usize,
        initial_labels: &Labels,
        fine_tile_grid: &TileGrid,
        sky: &SkyMap,
        std: &StdMap,
        role: Role,
    ) -> Result<SNTable> {
        let ndim = image.ndim();
        let mut area = vec![0.0f64; num_labels + 1];
        let mut brightness = vec![0.0f64; num_labels + 1];
        let mut posw = vec![0.0f64; num_labels + 1];
        let mut pos_axis: Vec<Vec<f64>> = vec![vec![0.0f64; num_labels + 1]; ndim];
        let mut disqualified = vec![false; num_labels + 1];

        for linear in 0..image.size() {
            let label = worklab.as_slice()[linear];
            if label <= 0 || label == BLANK_I32 {
                continue;
            }
            let label = label as usize;
            if disqualified[label] {
                continue;
            }

            let value = image.as_slice()[linear];
            if value.is_nan() {
                continue;
            }

            if role == Role::Sky && initial_labels.as_slice()[linear] > 0 {
                disqualified[label] = true;
                area[label] = 0.0;
                brightness[label] = 0.0;
                posw[label] = 0.0;
                for axis_positions in &mut pos_axis {
                    axis_positions[label] = 0.0;
                }
                continue;
            }

            area[label] += 1.0;
            brightness[label] += value as f64;

            if value > 0.0 {
                let coord = image.coord_of(linear);
                posw[label] += value as f64;
                for (axis, &c) in coord.iter().enumerate() {
                    pos_axis[axis][label] += c as f64 * value as f64;
                }
            }
        }

        let mut raw_sn = vec![f32::NAN; num_labels + 1];

        for label in 1..=num_labels {
            if disqualified[label] {
                continue;
            }
            if area[label] <= self.min_area as f64 || brightness[label] <= 0.0 || posw[label] <= 0.0 {
                continue;
            }

            let mut centroid: Axes<usize> = smallvec::smallvec![0; ndim];
            for axis in 0..ndim {
                let c = pos_axis[axis][label] / posw[label];
                centroid[axis] = crate::math::round_coord(c, image.shape()[axis]);
            }

            let tile_index = fine_tile_grid.tile_index_of(&centroid);
            let sky_value = sky.values.get(tile_index).copied().unwrap_or(f32::NAN);
            let std_value = std.values.get(tile_index).copied().unwrap_or(f32::NAN);
            if sky_value.is_nan() || std_value.is_nan() {
                continue;
            }

            let mean = (brightness[label] / area[label]) as f32 - sky_value;
            let variance = std_value * std_value;
            let noise_variance = if self.sky_subtracted { variance } else { 2.0 * variance };

            let sn = (area[label] as f32 / self.cpscorr).sqrt() * mean / (mean + noise_variance).sqrt();
            raw_sn[label] = sn;
        }

        let values = match role {
            Role::Sky => raw_sn.into_iter().skip(1).filter(|v| v.is_finite()).collect(),
            Role::Det | Role::Final => raw_sn,
        };

        if values.is_empty() && role == Role::Sky {
            return Err(Error::empty_calibration_set(
                "no sky pseudo-detection produced a finite S/N; relax dthresh, detsn_min_area, \
                 or increase the sky region considered",
            ));
        }

        Ok(SNTable { values, role })
    }
}

/// Stage A: initializes `workbin` from `threshold_binary` and
/// `initial_labels` per the role's rule.
///
/// `blank_counts_as_sky_detection` resolves the Open Question of
/// SPEC_FULL's supplemented features: the source's commented-out
/// "blank-on-sky fill-in" would have set blank pixels to foreground
/// while calibrating the sky side. When `true` and `role == Role::Sky`,
/// a blank pixel becomes foreground (`1`) instead of staying blank.
fn prepare(threshold_binary: &Binary, initial_labels: &Labels, role: Role, blank_counts_as_sky_detection: bool) -> Binary {
    let shape = threshold_binary.shape().clone();
    let mut data = vec![0u8; threshold_binary.size()];

    for linear in 0..threshold_binary.size() {
        let threshold_value = threshold_binary.as_slice()[linear];
        if threshold_value == BLANK_U8 {
            data[linear] = if role == Role::Sky && blank_counts_as_sky_detection { 1 } else { BLANK_U8 };
            continue;
        }

        let initial_label = initial_labels.as_slice()[linear];
        data[linear] = match role {
            Role::Sky => {
                if initial_label == 0 {
                    threshold_value
                } else {
                    0
                }
            }
            Role::Det => {
                if initial_label > 0 {
                    1
                } else {
                    threshold_value
                }
            }
            Role::Final => unreachable!("Final role never calls prepare"),
        };
    }

    Binary::from_data(shape, data)
}

/// Stage B: per large tile, `fill_holes` then `open(depth=1,
/// orthogonal)`, parallelized across `TileEngine` workers.
///
/// Each tile is read into its own contiguous scratch and processed
/// independently, so the parallel map phase touches no shared mutable
/// state (spec §5 "ordering guarantees" — tiles are disjoint). The
/// scatter-back into `workbin` runs after that barrier, sequentially,
/// since it is the one phase that does touch the shared grid.
fn fill_then_open(workbin: &mut Binary, large_tile_grid: &TileGrid, tile_engine: &TileEngine) {
    use rayon::prelude::*;

    let ndim = workbin.ndim();
    let orthogonal = match ndim {
        2 => Connectivity::Four,
        3 => Connectivity::Six,
        _ => unreachable!("grids are only ever 2- or 3-dimensional"),
    };

    let workbin_shared: &Binary = workbin;
    let processed: Vec<Vec<u8>> = tile_engine.install(|| {
        large_tile_grid
            .iter()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|tile| {
                let mut scratch = vec![0u8; tile.size()];
                large_tile_grid.copy_tile_to_contiguous(workbin_shared, tile, &mut scratch);
                let mut scratch_grid = Binary::from_data(tile.extent.clone(), scratch);
                fill_holes(&mut scratch_grid);
                open(&mut scratch_grid, 1, orthogonal);
                scratch_grid.into_data()
            })
            .collect()
    });

    for (tile, data) in large_tile_grid.iter().zip(processed.into_iter()) {
        large_tile_grid.copy_contiguous_to_tile(&data, tile, workbin);
    }
}
