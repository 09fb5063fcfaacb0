//! `Thresholder` (spec §4.4, contract-only) and its one concrete
//! `reference` implementation.
//!
//! The core depends only on the `QuantileThresholder` trait; a caller
//! may substitute any other tiled arithmetic primitive that honors the
//! same contract.

use crate::grid::{Binary, Image, NO_ERODE};
use crate::tile::TileGrid;

/// Per-tile quantile value used by a threshold pass, aligned to a
/// `TileGrid`'s tile ordering.
pub struct PerTileQuantiles {
    pub values: Vec<f32>,
}

/// Given `image`, a per-tile quantile map, and an optional per-tile
/// "no-erode" quantile map, writes `0`/`1`/`NO_ERODE` into `binary_out`.
/// Blank input pixels are left untouched (the caller pre-seeds
/// `binary_out` via [`crate::grid::Image::blank_seeded_binary`]).
pub trait QuantileThresholder {
    fn apply(
        &self,
        image: &Image,
        tile_grid: &TileGrid,
        quantiles: &PerTileQuantiles,
        no_erode_quantiles: Option<&PerTileQuantiles>,
        binary_out: &mut Binary,
    ) -> crate::error::Result<()>;
}

/// A straightforward per-tile quantile-of-values thresholder: for each
/// pixel, compares against its tile's quantile value directly (the
/// quantile value is itself a pixel-value threshold, not a sigma
/// multiplier — sigma-based thresholding is the caller's responsibility
/// when it builds `quantiles` from a `SkyMap`/`StdMap`).
pub struct ReferenceThresholder;

impl QuantileThresholder for ReferenceThresholder {
    fn apply(
        &self,
        image: &Image,
        tile_grid: &TileGrid,
        quantiles: &PerTileQuantiles,
        no_erode_quantiles: Option<&PerTileQuantiles>,
        binary_out: &mut Binary,
    ) -> crate::error::Result<()> {
        if quantiles.values.len() != tile_grid.total_tiles() {
            return Err(crate::error::Error::shape_mismatch(format!(
                "threshold map has {} entries but the tile grid has {} tiles",
                quantiles.values.len(),
                tile_grid.total_tiles()
            )));
        }
        if let Some(no_erode) = no_erode_quantiles {
            if no_erode.values.len() != tile_grid.total_tiles() {
                return Err(crate::error::Error::shape_mismatch(format!(
                    "no-erode threshold map has {} entries but the tile grid has {} tiles",
                    no_erode.values.len(),
                    tile_grid.total_tiles()
                )));
            }
        }

        for linear in 0..image.size() {
            let value = image.as_slice()[linear];
            if value.is_nan() {
                continue;
            }

            let coord = image.coord_of(linear);
            let tile_index = tile_grid.tile_index_of(&coord);
            let cut = quantiles.values[tile_index];

            let written = if let Some(no_erode) = no_erode_quantiles {
                if value > no_erode.values[tile_index] {
                    NO_ERODE
                } else if value > cut {
                    1
                } else {
                    0
                }
            } else if value > cut {
                1
            } else {
                0
            };

            *binary_out.as_mut_slice().get_mut(linear).unwrap() = written;
        }

        Ok(())
    }
}
