//! Small numeric helpers shared across the detection pipeline.
//!
//! Kept free of any grid or pipeline types so it can be unit tested in
//! isolation, the same way the teacher keeps its own `math` module a leaf
//! dependency of everything else.

use smallvec::SmallVec;

/// A small per-axis vector, sized for the 2-D/3-D grids this crate supports.
/// `SmallVec` avoids a heap allocation for the common case.
pub type Axes<T> = SmallVec<[T; 3]>;

/// Rounds a flux-weighted coordinate to the nearest pixel index.
///
/// Matches the reference implementation's float-to-int conversion: round
/// half away from zero, then clamp into `[0, len)` so a centroid that
/// lands exactly on (or a hair beyond, due to floating point error) the
/// last valid coordinate still resolves to an in-bounds tile lookup.
pub fn round_coord(value: f64, len: usize) -> usize {
    let rounded = value.round();
    if rounded <= 0.0 {
        0
    } else if rounded >= len as f64 {
        len.saturating_sub(1)
    } else {
        rounded as usize
    }
}

/// Quantile of a slice of finite `f32` values using linear interpolation
/// between closest ranks. `q` must be in `[0, 1]`. Returns `None` for an
/// empty slice.
///
/// The input is not assumed to be sorted; a sorted copy is made
/// internally. Callers on a hot path should sort once and call
/// [`quantile_sorted`] instead.
pub fn quantile(values: &[f32], q: f64) -> Option<f32> {
    if values.is_empty() {
        return None;
    }

    let mut sorted: Vec<f32> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("quantile input must be finite"));
    Some(quantile_sorted(&sorted, q))
}

/// As [`quantile`], but assumes `sorted` is already sorted ascending.
pub fn quantile_sorted(sorted: &[f32], q: f64) -> f32 {
    debug_assert!(!sorted.is_empty());
    debug_assert!((0.0..=1.0).contains(&q));

    if sorted.len() == 1 {
        return sorted[0];
    }

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let frac = (position - lower as f64) as f32;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Number of tiles of size `tile_size` needed to cover `full_size`,
/// rounding up so a final partial tile is still counted.
pub fn tile_count(full_size: usize, tile_size: usize) -> usize {
    debug_assert_ne!(tile_size, 0);
    (full_size + tile_size - 1) / tile_size
}
