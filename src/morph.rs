//! `BinaryMorph` (spec §4.1): erosion, dilation, opening, and hole-fill
//! over a `Binary` grid's `{0, 1, BLANK_U8}` alphabet, plus the
//! transient `NO_ERODE` marker which these operators simply ignore
//! (it is collapsed to `1` by the pipeline, outside this module).
//!
//! Blank pixels are inert: never read by the structuring element, never
//! written to anything but `BLANK_U8`.

use crate::grid::{Binary, Connectivity, BLANK_U8};
use crate::label::label_connected_components;

/// `times` iterations of: a 1-pixel becomes 0 if any neighbor under
/// `connectivity` is background. Multi-pass uses a write-through rule —
/// each pass reads only the *pre-pass* state, so passes within a single
/// call never see each other's writes.
pub fn erode(binary: &mut Binary, times: usize, connectivity: Connectivity) {
    for _ in 0..times {
        step(binary, connectivity, true);
    }
}

/// Dual of [`erode`]: a 0-pixel becomes 1 if any neighbor under
/// `connectivity` is foreground.
pub fn dilate(binary: &mut Binary, times: usize, connectivity: Connectivity) {
    for _ in 0..times {
        step(binary, connectivity, false);
    }
}

/// `depth` erosions followed by `depth` dilations, same connectivity.
pub fn open(binary: &mut Binary, depth: usize, connectivity: Connectivity) {
    erode(binary, depth, connectivity);
    dilate(binary, depth, connectivity);
}

/// One erosion or dilation pass. `eroding` selects which.
///
/// Edge policy (spec §4.1): the grid has no wrap-around, and a
/// structuring element that runs off the edge simply has fewer
/// neighbors to consult there — an out-of-bounds neighbor never flips a
/// pixel, for either erosion or dilation.
fn step(binary: &mut Binary, connectivity: Connectivity, eroding: bool) {
    let shape = binary.shape().clone();
    let ndim = shape.len();
    let offsets = connectivity.offsets(ndim);
    let before = binary.as_slice().to_vec();
    let target_value: u8 = if eroding { 1 } else { 0 };
    let flipped_value: u8 = if eroding { 0 } else { 1 };

    for linear in 0..before.len() {
        if before[linear] != target_value {
            continue;
        }

        let coord = binary.coord_of(linear);
        let mut flip = false;

        for offset in &offsets {
            match neighbor_value(&before, &shape, &coord, offset) {
                Some(BLANK_U8) => continue, // inert: never consulted
                Some(value) if value == flipped_value => {
                    flip = true;
                    break;
                }
                Some(_) => continue,
                None => continue, // out of bounds: not consulted
            }
        }

        if flip {
            *binary.get_mut(&coord) = flipped_value;
        }
    }
}

fn neighbor_value(
    data: &[u8],
    shape: &crate::grid::Shape,
    coord: &[usize],
    offset: &[isize],
) -> Option<u8> {
    let mut index = 0usize;
    for (axis, (&c, &d)) in coord.iter().zip(offset.iter()).enumerate() {
        let next = c as isize + d;
        if next < 0 || next >= shape[axis] as isize {
            return None;
        }
        index = index * shape[axis] + next as usize;
    }
    Some(data[index])
}

/// Fills every background region (spec's orthogonal connectivity — 4 in
/// 2-D, 6 in 3-D, regardless of the caller's own connectivity choice)
/// that does not touch the grid boundary.
///
/// Implementation contract (spec §4.1): build the inverse of `binary`
/// (foreground pixels and blanks become inert walls, background pixels
/// become the inverse's foreground), label the inverse's connected
/// components, and fill every original-0 pixel whose inverse label is
/// not one of the labels touching the grid boundary.
pub fn fill_holes(binary: &mut Binary) {
    let ndim = binary.ndim();
    let hole_connectivity = match ndim {
        2 => Connectivity::Four,
        3 => Connectivity::Six,
        _ => unreachable!("grids are only ever 2- or 3-dimensional"),
    };

    let inverse_data: Vec<u8> = binary
        .as_slice()
        .iter()
        .map(|&v| if v == 0 { 1 } else { 0 })
        .collect();
    let inverse = Binary::from_data(binary.shape().clone(), inverse_data);

    let (hole_labels, _count) = label_connected_components(&inverse, hole_connectivity);

    let boundary_labels = boundary_touching_labels(&hole_labels);

    for linear in 0..binary.size() {
        if binary.as_slice()[linear] != 0 {
            continue;
        }

        let label = hole_labels.as_slice()[linear];
        if label > 0 && !boundary_labels.contains(&label) {
            let coord = binary.coord_of(linear);
            *binary.get_mut(&coord) = 1;
        }
    }
}

fn boundary_touching_labels(labels: &crate::grid::Labels) -> std::collections::HashSet<i32> {
    let shape = labels.shape().clone();
    let mut touching = std::collections::HashSet::new();

    for linear in 0..labels.size() {
        let label = labels.as_slice()[linear];
        if label <= 0 {
            continue;
        }

        let coord = labels.coord_of(linear);
        let on_boundary = coord
            .iter()
            .zip(shape.iter())
            .any(|(&c, &s)| c == 0 || c + 1 == s);

        if on_boundary {
            touching.insert(label);
        }
    }

    touching
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::grid::Grid;

    fn binary_from_rows(rows: &[&[u8]]) -> Binary {
        let height = rows.len();
        let width = rows[0].len();
        let data: Vec<u8> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        Grid::from_data(smallvec::smallvec![height, width], data)
    }

    #[test]
    fn erosion_shrinks_a_solid_block() {
        let mut binary = binary_from_rows(&[
            &[0, 0, 0, 0],
            &[0, 1, 1, 0],
            &[0, 1, 1, 0],
            &[0, 0, 0, 0],
        ]);

        erode(&mut binary, 1, Connectivity::Four);
        assert_eq!(binary.as_slice().iter().filter(|&&v| v == 1).count(), 0);
    }

    #[test]
    fn erosion_is_monotonic() {
        let mut binary = binary_from_rows(&[
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
            &[1, 1, 1, 1, 1],
        ]);
        let before: Vec<u8> = binary.as_slice().to_vec();

        erode(&mut binary, 1, Connectivity::Eight);

        for (was, is) in before.iter().zip(binary.as_slice().iter()) {
            assert!(*is <= *was, "erosion must never create new foreground");
        }
    }

    #[test]
    fn dilation_is_dual_of_erosion_on_background() {
        let mut binary = binary_from_rows(&[
            &[0, 0, 0, 0, 0],
            &[0, 0, 1, 0, 0],
            &[0, 0, 0, 0, 0],
        ]);

        dilate(&mut binary, 1, Connectivity::Four);
        assert_eq!(*binary.get(&[1, 1]), 1);
        assert_eq!(*binary.get(&[1, 3]), 1);
        assert_eq!(*binary.get(&[0, 2]), 1);
        assert_eq!(*binary.get(&[2, 2]), 1);
    }

    #[test]
    fn blank_pixels_are_never_altered() {
        let mut binary = binary_from_rows(&[&[1, BLANK_U8, 0]]);
        erode(&mut binary, 1, Connectivity::Four);
        assert_eq!(*binary.get(&[0, 1]), BLANK_U8);
        dilate(&mut binary, 1, Connectivity::Four);
        assert_eq!(*binary.get(&[0, 1]), BLANK_U8);
    }

    #[test]
    fn opening_is_idempotent_at_fixed_depth() {
        let mut binary = binary_from_rows(&[
            &[0, 1, 0, 0, 0],
            &[1, 1, 1, 0, 1],
            &[0, 1, 0, 0, 0],
            &[0, 0, 0, 1, 1],
            &[0, 0, 0, 1, 1],
        ]);

        open(&mut binary, 1, Connectivity::Eight);
        let once = binary.as_slice().to_vec();
        open(&mut binary, 1, Connectivity::Eight);

        assert_eq!(binary.as_slice(), once.as_slice());
    }

    #[test]
    fn fill_holes_closes_an_enclosed_annulus() {
        // a 5x5 ring with a hole in the middle
        let mut binary = binary_from_rows(&[
            &[1, 1, 1, 1, 1],
            &[1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1],
            &[1, 1, 1, 1, 1],
        ]);

        fill_holes(&mut binary);

        assert!(binary.as_slice().iter().all(|&v| v == 1));
    }

    #[test]
    fn fill_holes_leaves_boundary_touching_background_alone() {
        let mut binary = binary_from_rows(&[
            &[0, 1, 1, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
        ]);

        fill_holes(&mut binary);

        // the single enclosed 0 becomes 1, the border background columns do not
        assert_eq!(*binary.get(&[1, 2]), 1);
        assert_eq!(*binary.get(&[0, 0]), 0);
        assert_eq!(*binary.get(&[2, 4]), 0);
    }

    #[test]
    fn fill_holes_is_idempotent() {
        let mut binary = binary_from_rows(&[
            &[1, 1, 1, 1, 1],
            &[1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1],
            &[1, 0, 0, 0, 1],
            &[1, 1, 1, 1, 1],
        ]);

        fill_holes(&mut binary);
        let once = binary.as_slice().to_vec();
        fill_holes(&mut binary);

        assert_eq!(binary.as_slice(), once.as_slice());
    }
}
