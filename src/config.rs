//! `Config` (SPEC_FULL "Ambient stack — Configuration"): the options
//! table of spec §6, validated once at construction and borrowed for
//! the pipeline's duration (spec §9 "Global parameter block").

use crate::error::{Error, Result};
use crate::grid::Connectivity;
use crate::math::Axes;

/// Validated configuration for a `DetectionPipeline` run.
///
/// Built via [`Config::new`], which rejects out-of-range values
/// immediately rather than letting them surface as a confusing failure
/// mid-pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub erode_times: usize,
    pub erode_connectivity: Connectivity,
    pub opening_depth: usize,
    pub opening_connectivity: Connectivity,
    pub dthresh: f32,
    pub detsn_min_area: usize,
    pub detquant: f64,
    pub dilate: usize,
    pub clean_dilated: bool,
    pub sky_subtracted: bool,
    pub cpscorr: f32,
    pub num_threads: usize,
    pub large_tile_shape: Axes<usize>,
    pub fine_tile_shape: Axes<usize>,

    /// Resolved Open Question (SPEC_FULL "Supplemented features"): the
    /// source's commented-out "blank-on-sky fill-in" block, surfaced
    /// as an explicit option rather than guessed at. Defaults to
    /// `false`, preserving the behavior actually shipped (the block is
    /// commented out).
    pub blank_counts_as_sky_detection: bool,
}

impl Config {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ndim: usize,
        erode_times: usize,
        erode_connectivity: Connectivity,
        opening_depth: usize,
        opening_connectivity: Connectivity,
        dthresh: f32,
        detsn_min_area: usize,
        detquant: f64,
        dilate: usize,
        clean_dilated: bool,
        sky_subtracted: bool,
        cpscorr: f32,
        num_threads: usize,
        large_tile_shape: Axes<usize>,
        fine_tile_shape: Axes<usize>,
    ) -> Result<Self> {
        erode_connectivity.validate_for_ndim(ndim)?;
        opening_connectivity.validate_for_ndim(ndim)?;

        if !(0.0..1.0).contains(&detquant) || detquant <= 0.0 {
            return Err(Error::config_invalid(format!(
                "detquant must be in (0,1), got {}",
                detquant
            )));
        }
        if cpscorr <= 0.0 {
            return Err(Error::config_invalid(format!("cpscorr must be positive, got {}", cpscorr)));
        }
        if num_threads == 0 {
            return Err(Error::config_invalid("num_threads must be positive"));
        }
        if large_tile_shape.len() != ndim || fine_tile_shape.len() != ndim {
            return Err(Error::config_invalid(format!(
                "tile shapes must have rank {} to match the image",
                ndim
            )));
        }
        if large_tile_shape.iter().any(|&s| s == 0) || fine_tile_shape.iter().any(|&s| s == 0) {
            return Err(Error::config_invalid("tile shapes must have no zero-length axis"));
        }

        Ok(Config {
            erode_times,
            erode_connectivity,
            opening_depth,
            opening_connectivity,
            dthresh,
            detsn_min_area,
            detquant,
            dilate,
            clean_dilated,
            sky_subtracted,
            cpscorr,
            num_threads,
            large_tile_shape,
            fine_tile_shape,
            blank_counts_as_sky_detection: false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn valid_2d() -> Result<Config> {
        Config::new(
            2,
            2,
            Connectivity::Eight,
            1,
            Connectivity::Four,
            -2.0,
            10,
            0.99,
            1,
            true,
            true,
            1.0,
            4,
            smallvec::smallvec![32, 32],
            smallvec::smallvec![8, 8],
        )
    }

    #[test]
    fn valid_config_is_accepted() {
        assert!(valid_2d().is_ok());
    }

    #[test]
    fn detquant_out_of_range_is_rejected() {
        let mut result = valid_2d().unwrap();
        result.detquant = 1.5;
        let rebuilt = Config::new(
            2,
            result.erode_times,
            result.erode_connectivity,
            result.opening_depth,
            result.opening_connectivity,
            result.dthresh,
            result.detsn_min_area,
            1.5,
            result.dilate,
            result.clean_dilated,
            result.sky_subtracted,
            result.cpscorr,
            result.num_threads,
            result.large_tile_shape,
            result.fine_tile_shape,
        );
        assert!(matches!(rebuilt, Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn connectivity_mismatched_with_ndim_is_rejected() {
        let result = Config::new(
            2,
            1,
            Connectivity::Six, // invalid for 2-D
            1,
            Connectivity::Four,
            -2.0,
            10,
            0.99,
            1,
            true,
            true,
            1.0,
            4,
            smallvec::smallvec![32, 32],
            smallvec::smallvec![8, 8],
        );
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn zero_threads_is_rejected() {
        let result = Config::new(
            2,
            1,
            Connectivity::Eight,
            1,
            Connectivity::Four,
            -2.0,
            10,
            0.99,
            1,
            true,
            true,
            1.0,
            0,
            smallvec::smallvec![32, 32],
            smallvec::smallvec![8, 8],
        );
        assert!(matches!(result, Err(Error::ConfigInvalid(_))));
    }
}
