//! Spatial hash grid for fixed-radius neighbor queries.
//!
//! The grid partitions a bounded 2D world into fixed-size cells. It is a
//! pure projection: occupancy is cleared and rebuilt from the latest agent
//! readback every tick, which costs a little redundant hashing and buys
//! freedom from stale-entry bugs. Positions outside the bounds clamp to the
//! nearest edge cell, never panic.

use glam::Vec2;

use crate::sim::AgentId;

/// Fixed-bounds 2D grid mapping world positions to cells and cells to
/// agent-id lists.
pub struct SpatialGrid {
    origin: Vec2,
    cell_size: f32,
    size_x: u32,
    size_y: u32,
    cells: Vec<Vec<AgentId>>,
}

impl SpatialGrid {
    pub fn new(origin: Vec2, cell_size: f32, size_x: u32, size_y: u32) -> Self {
        assert!(cell_size > 0.0, "cell size must be positive");
        assert!(size_x > 0 && size_y > 0, "grid dimensions must be nonzero");
        Self {
            origin,
            cell_size,
            size_x,
            size_y,
            cells: (0..size_x as usize * size_y as usize)
                .map(|_| Vec::new())
                .collect(),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size_x, self.size_y)
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    /// Map a world position to its cell coordinate, clamped to the grid.
    pub fn tile_at(&self, pos: Vec2) -> (u32, u32) {
        let local = (pos - self.origin) / self.cell_size;
        let x = (local.x.floor() as i64).clamp(0, self.size_x as i64 - 1) as u32;
        let y = (local.y.floor() as i64).clamp(0, self.size_y as i64 - 1) as u32;
        (x, y)
    }

    /// Scalar cell hash: `x + y * size_x`. Only unique within one grid
    /// width.
    pub fn hash(&self, x: u32, y: u32) -> u32 {
        x + y * self.size_x
    }

    /// The 3x3 block centered on `(x, y)`, intersected with the bounds.
    /// Always contains `(x, y)` itself.
    pub fn neighbors(&self, x: u32, y: u32) -> Vec<(u32, u32)> {
        self.neighbors_in_radius(x, y, 1)
    }

    /// The `(2r+1) x (2r+1)` block centered on `(x, y)`, intersected with
    /// the bounds.
    pub fn neighbors_in_radius(&self, x: u32, y: u32, r: u32) -> Vec<(u32, u32)> {
        let r = r as i64;
        let (cx, cy) = (x as i64, y as i64);
        let mut out = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for ny in cy - r..=cy + r {
            if ny < 0 || ny >= self.size_y as i64 {
                continue;
            }
            for nx in cx - r..=cx + r {
                if nx < 0 || nx >= self.size_x as i64 {
                    continue;
                }
                out.push((nx as u32, ny as u32));
            }
        }
        out
    }

    /// Drop all occupancy, keeping cell allocations for reuse.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Record an agent in a cell. Out-of-bounds coordinates clamp.
    pub fn insert(&mut self, x: u32, y: u32, id: AgentId) {
        let x = x.min(self.size_x - 1);
        let y = y.min(self.size_y - 1);
        let idx = (x + y * self.size_x) as usize;
        self.cells[idx].push(id);
    }

    /// Agent ids recorded in one cell this tick.
    pub fn ids_at(&self, x: u32, y: u32) -> &[AgentId] {
        let x = x.min(self.size_x - 1);
        let y = y.min(self.size_y - 1);
        &self.cells[(x + y * self.size_x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_10x10() -> SpatialGrid {
        SpatialGrid::new(Vec2::new(-5.0, -5.0), 1.0, 10, 10)
    }

    #[test]
    fn test_origin_world_center_maps_to_middle_tile() {
        let grid = grid_10x10();
        assert_eq!(grid.tile_at(Vec2::ZERO), (5, 5));
        assert_eq!(grid.hash(5, 5), 55);
    }

    #[test]
    fn test_tile_at_is_stable_inside_one_cell() {
        let grid = grid_10x10();
        for pos in [
            Vec2::new(0.01, 0.01),
            Vec2::new(0.5, 0.5),
            Vec2::new(0.99, 0.99),
        ] {
            assert_eq!(grid.tile_at(pos), (5, 5));
        }
    }

    #[test]
    fn test_out_of_bounds_clamps_to_edge() {
        let grid = grid_10x10();
        assert_eq!(grid.tile_at(Vec2::new(-100.0, 0.0)), (0, 5));
        assert_eq!(grid.tile_at(Vec2::new(100.0, 100.0)), (9, 9));
        assert_eq!(grid.tile_at(Vec2::new(0.0, -100.0)), (5, 0));
    }

    #[test]
    fn test_neighbors_include_self_and_stay_in_bounds() {
        let grid = grid_10x10();

        let mid = grid.neighbors(5, 5);
        assert_eq!(mid.len(), 9);
        assert!(mid.contains(&(5, 5)));

        let corner = grid.neighbors(0, 0);
        assert_eq!(corner.len(), 4);
        assert!(corner.contains(&(0, 0)));
        for (x, y) in corner {
            assert!(x < 10 && y < 10);
        }
    }

    #[test]
    fn test_neighbors_in_radius() {
        let grid = grid_10x10();
        assert_eq!(grid.neighbors_in_radius(5, 5, 2).len(), 25);
        // Radius 2 at a corner keeps only the in-bounds quadrant
        assert_eq!(grid.neighbors_in_radius(0, 0, 2).len(), 9);
        assert_eq!(grid.neighbors_in_radius(5, 5, 0), vec![(5, 5)]);
    }

    #[test]
    fn test_occupancy_rebuild() {
        let mut grid = grid_10x10();
        grid.insert(3, 4, 7);
        grid.insert(3, 4, 9);
        assert_eq!(grid.ids_at(3, 4), &[7, 9]);

        grid.clear();
        assert!(grid.ids_at(3, 4).is_empty());
    }

    #[test]
    fn test_hash_row_major() {
        let grid = grid_10x10();
        assert_eq!(grid.hash(0, 0), 0);
        assert_eq!(grid.hash(9, 0), 9);
        assert_eq!(grid.hash(0, 1), 10);
        assert_eq!(grid.hash(9, 9), 99);
    }
}
