//! `TileEngine` (spec §4.3): partitions a grid's shape into fixed-size
//! tiles and distributes a per-tile callable across a fixed worker pool.
//!
//! Grounded in the teacher's own `rayon::ThreadPool` ownership pattern
//! (`block::mod::ParallelBlockDecompressor` builds and holds a pool
//! rather than reaching for the global one), generalized from "one job
//! per compressed block" to "one job per disjoint tile region." Tiles
//! are statically partitioned across workers by `rayon`'s own work-
//! stealing `par_iter`, which still gives every worker a disjoint slice
//! of tile indices and a single terminal barrier — the scheduling
//! contract spec §5 asks for, not a custom `for_each_tile` loop.

use crate::math::{tile_count, Axes};

/// Describes one tile: its origin coordinate and per-axis extent
/// within the parent grid's shape. Tiles at the shape's far edge may be
/// smaller than `TileGrid::tile_shape` when the shape does not divide
/// evenly.
#[derive(Debug, Clone)]
pub struct Tile {
    pub origin: Axes<usize>,
    pub extent: Axes<usize>,
}

impl Tile {
    pub fn size(&self) -> usize {
        self.extent.iter().product()
    }
}

/// A partition of a `ndim`-dimensional shape into tiles of a caller-
/// chosen nominal shape. Constant for the pipeline's duration (spec §5
/// "shared resources").
#[derive(Debug, Clone)]
pub struct TileGrid {
    full_shape: Axes<usize>,
    tile_shape: Axes<usize>,
    tiles_per_axis: Axes<usize>,
    tiles: Vec<Tile>,
    max_contiguous_tile_size: usize,
}

impl TileGrid {
    /// Builds the tile partition for `full_shape` using `tile_shape` as
    /// the nominal (non-final) tile extent along each axis.
    pub fn new(full_shape: Axes<usize>, tile_shape: Axes<usize>) -> Self {
        debug_assert_eq!(full_shape.len(), tile_shape.len());

        let tiles_per_axis: Axes<usize> = full_shape
            .iter()
            .zip(tile_shape.iter())
            .map(|(&full, &tile)| tile_count(full, tile))
            .collect();

        let mut tiles = Vec::new();
        let mut max_contiguous_tile_size = 0;
        enumerate_tiles(&full_shape, &tile_shape, &tiles_per_axis, &mut tiles);
        for tile in &tiles {
            max_contiguous_tile_size = max_contiguous_tile_size.max(tile.size());
        }

        TileGrid {
            full_shape,
            tile_shape,
            tiles_per_axis,
            tiles,
            max_contiguous_tile_size,
        }
    }

    pub fn total_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn max_contiguous_tile_size(&self) -> usize {
        self.max_contiguous_tile_size
    }

    pub fn tiles_per_axis(&self) -> &Axes<usize> {
        &self.tiles_per_axis
    }

    pub fn tile(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    /// The index of the tile containing a full-grid coordinate.
    pub fn tile_index_of(&self, coord: &[usize]) -> usize {
        let mut tile_coord: Axes<usize> = smallvec::smallvec![0; coord.len()];
        for (axis, &c) in coord.iter().enumerate() {
            tile_coord[axis] = c / self.tile_shape[axis];
        }
        self.linear_tile_index(&tile_coord)
    }

    fn linear_tile_index(&self, tile_coord: &[usize]) -> usize {
        let mut index = 0;
        for (axis, &c) in tile_coord.iter().enumerate() {
            index = index * self.tiles_per_axis[axis] + c;
        }
        index
    }

    /// Copies `tile`'s region of `src` (shaped `self.full_shape`) into
    /// `dst`, a contiguous buffer at least `tile.size()` long.
    pub fn copy_tile_to_contiguous<T: Copy>(&self, src: &crate::grid::Grid<T>, tile: &Tile, dst: &mut [T]) {
        let mut written = 0;
        visit_tile_rows(&self.full_shape, tile, |row_start_coord, row_len| {
            let linear_start = linear_index(&self.full_shape, &row_start_coord);
            dst[written..written + row_len].copy_from_slice(&src.as_slice()[linear_start..linear_start + row_len]);
            written += row_len;
        });
    }

    /// Inverse of [`copy_tile_to_contiguous`]: scatters a contiguous
    /// buffer back into `tile`'s region of `dst`.
    pub fn copy_contiguous_to_tile<T: Copy>(&self, src: &[T], tile: &Tile, dst: &mut crate::grid::Grid<T>) {
        let mut read = 0;
        visit_tile_rows(&self.full_shape, tile, |row_start_coord, row_len| {
            let linear_start = linear_index(&self.full_shape, &row_start_coord);
            dst.as_mut_slice()[linear_start..linear_start + row_len].copy_from_slice(&src[read..read + row_len]);
            read += row_len;
        });
    }
}

fn enumerate_tiles(full_shape: &[usize], tile_shape: &[usize], tiles_per_axis: &[usize], out: &mut Vec<Tile>) {
    let ndim = full_shape.len();
    let mut tile_coord = vec![0usize; ndim];
    enumerate_tiles_rec(0, &mut tile_coord, full_shape, tile_shape, tiles_per_axis, out);
}

fn enumerate_tiles_rec(
    axis: usize,
    tile_coord: &mut [usize],
    full_shape: &[usize],
    tile_shape: &[usize],
    tiles_per_axis: &[usize],
    out: &mut Vec<Tile>,
) {
    if axis == full_shape.len() {
        let origin: Axes<usize> = tile_coord
            .iter()
            .zip(tile_shape.iter())
            .map(|(&tc, &ts)| tc * ts)
            .collect();
        let extent: Axes<usize> = origin
            .iter()
            .zip(full_shape.iter())
            .zip(tile_shape.iter())
            .map(|((&o, &full), &nominal)| nominal.min(full - o))
            .collect();
        out.push(Tile { origin, extent });
        return;
    }

    for coord in 0..tiles_per_axis[axis] {
        tile_coord[axis] = coord;
        enumerate_tiles_rec(axis + 1, tile_coord, full_shape, tile_shape, tiles_per_axis, out);
    }
}

/// Visits each contiguous row of `tile` within `full_shape`, calling
/// `visit(row_start_coord, row_len)` once per row. A "row" is a run
/// along the innermost axis — contiguous in row-major storage — so
/// copy-in/copy-out never has to touch the grid more than one element
/// at a time per axis above the last.
fn visit_tile_rows(full_shape: &[usize], tile: &Tile, mut visit: impl FnMut(Axes<usize>, usize)) {
    let ndim = full_shape.len();
    let row_len = tile.extent[ndim - 1];

    if ndim == 2 {
        for row in 0..tile.extent[0] {
            let coord: Axes<usize> = smallvec::smallvec![tile.origin[0] + row, tile.origin[1]];
            visit(coord, row_len);
        }
    } else {
        for plane in 0..tile.extent[0] {
            for row in 0..tile.extent[1] {
                let coord: Axes<usize> = smallvec::smallvec![
                    tile.origin[0] + plane,
                    tile.origin[1] + row,
                    tile.origin[2]
                ];
                visit(coord, row_len);
            }
        }
    }
}

fn linear_index(shape: &[usize], coord: &[usize]) -> usize {
    let mut index = 0;
    for (&c, &s) in coord.iter().zip(shape.iter()) {
        index = index * s + c;
    }
    index
}

/// Owns the fixed worker pool the core's tile passes run on (spec §5:
/// "single-process, multi-threaded with a fixed worker pool of size
/// `P`"). Built once from `Config::num_threads` and reused for every
/// tiled stage in the pipeline.
pub struct TileEngine {
    pool: rayon::ThreadPool,
}

impl TileEngine {
    pub fn new(num_threads: usize) -> crate::error::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|err| crate::error::Error::config_invalid(format!("failed to build worker pool: {}", err)))?;
        Ok(TileEngine { pool })
    }

    /// Runs `job` once per tile in `grid`, statically distributed
    /// across the pool's workers. Each invocation gets a fresh
    /// `max_contiguous_tile_size`-capacity scratch buffer it owns
    /// exclusively; workers never touch another worker's tile (spec §5
    /// "ordering guarantees"). Returns only after every tile has run —
    /// the pool's `install` call is the terminal barrier.
    pub fn for_each_tile<F>(&self, grid: &TileGrid, job: F)
    where
        F: Fn(&Tile, &mut Vec<u8>) + Sync,
    {
        use rayon::prelude::*;

        self.pool.install(|| {
            grid.tiles.par_iter().for_each(|tile| {
                let mut scratch = vec![0u8; grid.max_contiguous_tile_size];
                job(tile, &mut scratch);
            });
        });
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `f` on the pool, blocking until it (and anything it spawns
    /// internally, such as a `par_iter`) completes. A thin pass-through
    /// to `rayon::ThreadPool::install` so other stages (e.g. `PseudoSN`'s
    /// `fill_then_open`) can run their own `par_iter` over tiles on this
    /// same fixed pool instead of `for_each_tile`'s scratch-buffer shape.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }
}
