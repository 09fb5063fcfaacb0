//! Reference collaborator implementations (SPEC_FULL "Ambient stack —
//! Reference collaborator implementations"). Spec §6 defines
//! `SkyStdEstimator` as an external interface the core only consumes;
//! this module provides one concrete, minimal implementation so the
//! crate is buildable and testable end-to-end, grounded in
//! `original_source/lib/statistics.c`'s `sigmaclip_converge`.
//!
//! A caller is free to replace this with a smarter estimator (e.g. one
//! that accounts for a gradient sky); the pipeline depends only on the
//! [`SkyStdEstimator`] trait.

use crate::error::{Error, Result};
use crate::grid::{Binary, Image};
use crate::tile::TileGrid;

/// Per-tile background level, aligned to a `TileGrid`'s tile ordering.
#[derive(Debug, Clone)]
pub struct SkyMap {
    pub values: Vec<f32>,
}

/// Per-tile noise (standard deviation), aligned to a `TileGrid`'s tile
/// ordering.
#[derive(Debug, Clone)]
pub struct StdMap {
    pub values: Vec<f32>,
}

/// External collaborator (spec §6): estimates per-tile sky level and
/// standard deviation from `image` restricted to the pixels `binary`
/// marks as candidate sky (`0`).
pub trait SkyStdEstimator {
    fn estimate(&self, image: &Image, binary: &Binary, tile_grid: &TileGrid) -> Result<(SkyMap, StdMap)>;
}

/// Sigma-clipped mean/std per tile, iterating until the standard
/// deviation's relative change between passes drops below `accuracy`
/// or `max_iterations` is reached — the same converge loop as
/// `sigmaclip_converge`, adapted to operate per-tile instead of over a
/// single flat array.
pub struct SigmaClippedSkyStdEstimator {
    pub sigma_multiple: f32,
    pub accuracy: f32,
    pub max_iterations: usize,
}

impl Default for SigmaClippedSkyStdEstimator {
    fn default() -> Self {
        SigmaClippedSkyStdEstimator {
            sigma_multiple: 3.0,
            accuracy: 0.01,
            max_iterations: 20,
        }
    }
}

impl SkyStdEstimator for SigmaClippedSkyStdEstimator {
    fn estimate(&self, image: &Image, binary: &Binary, tile_grid: &TileGrid) -> Result<(SkyMap, StdMap)> {
        if binary.size() != image.size() {
            return Err(Error::shape_mismatch(
                "sky/std estimator's binary mask is not the same size as the image",
            ));
        }

        let total_tiles = tile_grid.total_tiles();
        let mut per_tile_values: Vec<Vec<f32>> = vec![Vec::new(); total_tiles];

        for linear in 0..image.size() {
            if binary.as_slice()[linear] != 0 {
                continue; // candidate sky is only where the binary mask is background
            }
            let value = image.as_slice()[linear];
            if value.is_nan() {
                continue;
            }
            let coord = image.coord_of(linear);
            let tile_index = tile_grid.tile_index_of(&coord);
            per_tile_values[tile_index].push(value);
        }

        let mut sky_values = Vec::with_capacity(total_tiles);
        let mut std_values = Vec::with_capacity(total_tiles);

        for mut values in per_tile_values {
            if values.is_empty() {
                sky_values.push(f32::NAN);
                std_values.push(f32::NAN);
                continue;
            }
            values.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let (ave, std) = self.converge(&values);
            sky_values.push(ave);
            std_values.push(std);
        }

        Ok((SkyMap { values: sky_values }, StdMap { values: std_values }))
    }
}

impl SigmaClippedSkyStdEstimator {
    /// Repeatedly clips `sorted` (ascending) to `[median - s*std, median
    /// + s*std]` and recomputes mean/std, stopping when the std's
    /// relative change drops below `accuracy`. Returns the last
    /// converged `(mean, std)`, or the final pass's values if the loop
    /// exhausts `max_iterations` without converging.
    fn converge(&self, sorted: &[f32]) -> (f32, f32) {
        let mut start = 0usize;
        let mut end = sorted.len();
        let mut previous_std: Option<f32> = None;
        let mut ave = 0.0f32;
        let mut std = 0.0f32;

        for _ in 0..self.max_iterations {
            let window = &sorted[start..end];
            if window.is_empty() {
                break;
            }

            let median = window[window.len() / 2];
            let (window_ave, window_std) = mean_and_std(window);
            ave = window_ave;
            std = window_std;

            if let Some(prev) = previous_std {
                if std > 0.0 && ((prev - std) / std).abs() < self.accuracy {
                    break;
                }
            }

            let low = median - self.sigma_multiple * std;
            let high = median + self.sigma_multiple * std;

            let new_start = window.iter().position(|&v| v > low).map(|i| start + i).unwrap_or(end);
            let new_end = window
                .iter()
                .rposition(|&v| v < high)
                .map(|i| start + i + 1)
                .unwrap_or(new_start);

            if new_start >= new_end || (new_start == start && new_end == end) {
                previous_std = Some(std);
                break;
            }

            start = new_start;
            end = new_end;
            previous_std = Some(std);
        }

        (ave, std)
    }
}

fn mean_and_std(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f64;
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    let mean = sum / n;

    if values.len() < 2 {
        return (mean as f32, 0.0);
    }

    let variance: f64 = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, variance.sqrt() as f32)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::Grid;
    use rand::Rng;

    #[test]
    fn clean_gaussian_tile_recovers_known_std() {
        let mut rng = rand::rng();
        let shape: smallvec::SmallVec<[usize; 3]> = smallvec::smallvec![32, 32];
        let data: Vec<f32> = (0..32 * 32).map(|_| 100.0 + rng.random::<f32>() * 2.0 - 1.0).collect();
        let image = Image::from_data(shape.clone(), data);
        let binary: Binary = Grid::filled(shape.clone(), 0);
        let tile_grid = TileGrid::new(shape, smallvec::smallvec![32, 32]);

        let estimator = SigmaClippedSkyStdEstimator::default();
        let (sky, std) = estimator.estimate(&image, &binary, &tile_grid).unwrap();

        assert!((sky.values[0] - 100.0).abs() < 1.0);
        assert!(std.values[0] > 0.0 && std.values[0] < 2.0);
    }

    #[test]
    fn outlier_heavy_tile_still_converges() {
        let shape: smallvec::SmallVec<[usize; 3]> = smallvec::smallvec![4, 4];
        let mut data = vec![10.0f32; 16];
        data[0] = 1000.0; // a bright source pixel leaking into the sky sample
        let image = Image::from_data(shape.clone(), data);
        let binary: Binary = Grid::filled(shape.clone(), 0);
        let tile_grid = TileGrid::new(shape, smallvec::smallvec![4, 4]);

        let estimator = SigmaClippedSkyStdEstimator::default();
        let (sky, _std) = estimator.estimate(&image, &binary, &tile_grid).unwrap();

        assert!((sky.values[0] - 10.0).abs() < 5.0);
    }

    #[test]
    fn tile_with_no_sky_candidates_reports_nan() {
        let shape: smallvec::SmallVec<[usize; 3]> = smallvec::smallvec![2, 2];
        let image = Image::from_data(shape.clone(), vec![5.0; 4]);
        let binary: Binary = Grid::filled(shape.clone(), 1); // everything is "detected", no sky
        let tile_grid = TileGrid::new(shape, smallvec::smallvec![2, 2]);

        let estimator = SigmaClippedSkyStdEstimator::default();
        let (sky, std) = estimator.estimate(&image, &binary, &tile_grid).unwrap();

        assert!(sky.values[0].is_nan());
        assert!(std.values[0].is_nan());
    }
}
