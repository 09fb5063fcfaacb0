//! The core's grid data model (spec §3): `Image`, `Binary`, `Labels`,
//! and the `Shape`/`Connectivity` types they share.
//!
//! Every grid entity carries `ndim ∈ {2,3}` and a per-axis `shape`; total
//! element count is the product of `shape`. Coordinates are indexed
//! row-major for 2-D and plane-then-row for 3-D, matching the
//! deterministic scan order `ConnectedLabeler` relies on (spec §4.2).

use crate::error::{Error, Result};
use crate::math::Axes;

/// Sentinel written to a `Binary` pixel whose source pixel was blank (NaN).
pub const BLANK_U8: u8 = 255;

/// Transient marker written by the Thresholder for pixels above the
/// "no erode" quantile. Collapsed to `1` right after erosion runs, and
/// never seen by any other stage.
pub const NO_ERODE: u8 = 2;

/// Sentinel written to a `Labels` pixel whose source pixel was blank (NaN).
pub const BLANK_I32: i32 = i32::MIN;

/// Per-axis size of a 2-D or 3-D grid, smallest-axis-last (row-major).
pub type Shape = Axes<usize>;

/// Neighborhood used by a morphological or labeling operator.
///
/// 2-D grids accept `Four`/`Eight`; 3-D grids accept `Six`/`Eighteen`/
/// `TwentySix`. Requesting a connectivity that does not exist for a
/// grid's dimensionality is a programmer error (spec §4.1) and is
/// rejected by [`Connectivity::validate_for_ndim`] rather than silently
/// reinterpreted.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Connectivity {
    Four,
    Eight,
    Six,
    Eighteen,
    TwentySix,
}

impl Connectivity {
    pub fn validate_for_ndim(self, ndim: usize) -> Result<()> {
        let ok = match (self, ndim) {
            (Connectivity::Four, 2) | (Connectivity::Eight, 2) => true,
            (Connectivity::Six, 3) | (Connectivity::Eighteen, 3) | (Connectivity::TwentySix, 3) => true,
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(Error::config_invalid(format!(
                "connectivity {:?} is not valid for a {}-dimensional grid",
                self, ndim
            )))
        }
    }

    /// The maximal (most permissive) connectivity for a given `ndim`.
    /// Used by the pipeline's final dilation step, which always dilates
    /// with full connectivity regardless of the erosion connectivity
    /// configured (spec §4.6 step 10, grounded in the reference
    /// implementation's `gal_binary_dilate(..., p->input->ndim, 1)`).
    pub fn maximal_for_ndim(ndim: usize) -> Connectivity {
        match ndim {
            2 => Connectivity::Eight,
            3 => Connectivity::TwentySix,
            _ => unreachable!("grids are only ever 2- or 3-dimensional"),
        }
    }

    /// Relative neighbor offsets (excluding the zero offset) for this
    /// connectivity, one `Axes<isize>` per neighbor.
    pub fn offsets(self, ndim: usize) -> Vec<Axes<isize>> {
        match self {
            Connectivity::Four => orthogonal_offsets(2),
            Connectivity::Six => orthogonal_offsets(3),
            Connectivity::Eight => full_offsets(2),
            Connectivity::TwentySix => full_offsets(3),
            Connectivity::Eighteen => full_offsets(3)
                .into_iter()
                .filter(|offset| offset.iter().map(|c| c.abs()).sum::<isize>() <= 2)
                .collect(),
        }
        .into_iter()
        .map(|offset| {
            debug_assert_eq!(offset.len(), ndim);
            offset
        })
        .collect()
    }
}

fn orthogonal_offsets(ndim: usize) -> Vec<Axes<isize>> {
    let mut offsets = Vec::with_capacity(2 * ndim);
    for axis in 0..ndim {
        for &delta in &[-1isize, 1] {
            let mut offset: Axes<isize> = smallvec::smallvec![0; ndim];
            offset[axis] = delta;
            offsets.push(offset);
        }
    }
    offsets
}

fn full_offsets(ndim: usize) -> Vec<Axes<isize>> {
    let mut offsets = Vec::new();
    let mut current: Axes<isize> = smallvec::smallvec![0; ndim];
    full_offsets_rec(ndim, 0, &mut current, &mut offsets);
    offsets
}

fn full_offsets_rec(ndim: usize, axis: usize, current: &mut Axes<isize>, out: &mut Vec<Axes<isize>>) {
    if axis == ndim {
        if current.iter().any(|&c| c != 0) {
            out.push(current.clone());
        }
        return;
    }

    for delta in -1isize..=1 {
        current[axis] = delta;
        full_offsets_rec(ndim, axis + 1, current, out);
    }
}

/// A dense `ndim`-dimensional grid of `T`, stored row-major
/// (plane-then-row in 3-D).
#[derive(Debug, Clone)]
pub struct Grid<T> {
    shape: Shape,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn filled(shape: Shape, value: T) -> Self {
        let size = shape.iter().product();
        Grid { data: vec![value; size], shape }
    }
}

impl<T> Grid<T> {
    pub fn from_data(shape: Shape, data: Vec<T>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "grid data length must equal the product of its shape"
        );
        Grid { shape, data }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// Row-major linear index of a coordinate. Panics (debug only) if the
    /// coordinate's rank does not match the grid's `ndim`.
    pub fn linear_index(&self, coord: &[usize]) -> usize {
        debug_assert_eq!(coord.len(), self.shape.len());
        let mut index = 0;
        for (c, s) in coord.iter().zip(self.shape.iter()) {
            debug_assert!(c < s);
            index = index * s + c;
        }
        index
    }

    /// Inverse of [`linear_index`](Self::linear_index): the coordinate a
    /// linear offset corresponds to.
    pub fn coord_of(&self, mut index: usize) -> Axes<usize> {
        let mut coord: Axes<usize> = smallvec::smallvec![0; self.shape.len()];
        for axis in (0..self.shape.len()).rev() {
            coord[axis] = index % self.shape[axis];
            index /= self.shape[axis];
        }
        coord
    }

    pub fn get(&self, coord: &[usize]) -> &T {
        &self.data[self.linear_index(coord)]
    }

    pub fn get_mut(&mut self, coord: &[usize]) -> &mut T {
        let index = self.linear_index(coord);
        &mut self.data[index]
    }

    /// Neighbor coordinates of `coord` under `connectivity`, clipped to
    /// the grid (out-of-bounds neighbors are simply omitted — §4.1's
    /// "pixels outside the grid are treated as 0/1" is handled by each
    /// operator, not here, since the correct out-of-bounds value differs
    /// between erosion and dilation).
    pub fn in_bounds_neighbors(&self, coord: &[usize], connectivity: Connectivity) -> Vec<Axes<usize>> {
        connectivity
            .offsets(self.ndim())
            .into_iter()
            .filter_map(|offset| self.offset_coord(coord, &offset))
            .collect()
    }

    fn offset_coord(&self, coord: &[usize], offset: &[isize]) -> Option<Axes<usize>> {
        let mut result: Axes<usize> = smallvec::smallvec![0; coord.len()];
        for (axis, (&c, &d)) in coord.iter().zip(offset.iter()).enumerate() {
            let next = c as isize + d;
            if next < 0 || next >= self.shape[axis] as isize {
                return None;
            }
            result[axis] = next as usize;
        }
        Some(result)
    }
}

/// Input pixel values (spec §3). NaN marks a blank ("no observation")
/// pixel. Never mutated by the core; borrowed read-only throughout.
pub type Image = Grid<f32>;

/// The evolving detection mask. Alphabet `{0, 1, BLANK_U8}`, plus the
/// transient `NO_ERODE` marker between thresholding and erosion.
pub type Binary = Grid<u8>;

/// Per-pixel label assignment. `0` is background, `BLANK_I32` is blank,
/// positive values enumerate connected components.
pub type Labels = Grid<i32>;

impl Image {
    /// A `Binary` grid the same shape as this image, with every blank
    /// (NaN) pixel pre-seeded to `BLANK_U8` and every other pixel set to
    /// `fill`. Stages that build a working binary grid from scratch
    /// start here so blank propagation (spec P1) is automatic.
    pub fn blank_seeded_binary(&self, fill: u8) -> Binary {
        let data = self
            .as_slice()
            .iter()
            .map(|&v| if v.is_nan() { BLANK_U8 } else { fill })
            .collect();
        Binary::from_data(self.shape().clone(), data)
    }

    /// A `Labels` grid the same shape as this image, with every blank
    /// pixel pre-seeded to `BLANK_I32` and every other pixel set to `0`.
    pub fn blank_seeded_labels(&self) -> Labels {
        let data = self
            .as_slice()
            .iter()
            .map(|&v| if v.is_nan() { BLANK_I32 } else { 0 })
            .collect();
        Labels::from_data(self.shape().clone(), data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn four_connectivity_has_four_offsets_in_2d() {
        assert_eq!(Connectivity::Four.offsets(2).len(), 4);
        assert_eq!(Connectivity::Eight.offsets(2).len(), 8);
    }

    #[test]
    fn connectivity_3d_offset_counts() {
        assert_eq!(Connectivity::Six.offsets(3).len(), 6);
        assert_eq!(Connectivity::Eighteen.offsets(3).len(), 18);
        assert_eq!(Connectivity::TwentySix.offsets(3).len(), 26);
    }

    #[test]
    fn connectivity_rejects_wrong_ndim() {
        assert!(Connectivity::Four.validate_for_ndim(3).is_err());
        assert!(Connectivity::Six.validate_for_ndim(2).is_err());
        assert!(Connectivity::Eight.validate_for_ndim(2).is_ok());
    }

    #[test]
    fn linear_index_row_major_roundtrip() {
        let grid: Grid<u8> = Grid::filled(smallvec::smallvec![4, 5], 0);
        for y in 0..4 {
            for x in 0..5 {
                let idx = grid.linear_index(&[y, x]);
                assert_eq!(grid.coord_of(idx).as_slice(), &[y, x]);
            }
        }
    }

    #[test]
    fn neighbors_are_clipped_at_grid_edges() {
        let grid: Grid<u8> = Grid::filled(smallvec::smallvec![3, 3], 0);
        let corner_neighbors = grid.in_bounds_neighbors(&[0, 0], Connectivity::Eight);
        assert_eq!(corner_neighbors.len(), 3);
    }

    #[test]
    fn blank_seeding_propagates_nan() {
        let image = Image::from_data(smallvec::smallvec![1, 3], vec![1.0, f32::NAN, 2.0]);
        let binary = image.blank_seeded_binary(0);
        assert_eq!(binary.as_slice(), &[0, BLANK_U8, 0]);

        let labels = image.blank_seeded_labels();
        assert_eq!(labels.as_slice(), &[0, BLANK_I32, 0]);
    }
}
