//! Grid geometry helpers
//!
//! Pure functions plus `WallMap`, a per-cell index over the wall list used by
//! every collision and placement query.

use glam::{IVec2, Vec2};

use super::state::{Wall, WallKind};
use crate::consts::*;

/// The four movement directions, in a fixed order
pub const CARDINALS: [IVec2; 4] = [IVec2::NEG_Y, IVec2::X, IVec2::Y, IVec2::NEG_X];

/// Euclidean distance between two cells
#[inline]
pub fn distance(a: IVec2, b: IVec2) -> f32 {
    a.as_vec2().distance(b.as_vec2())
}

#[inline]
pub fn in_bounds(p: IVec2) -> bool {
    p.x >= 0 && p.x < GRID_WIDTH && p.y >= 0 && p.y < GRID_HEIGHT
}

#[inline]
pub fn is_perimeter(p: IVec2) -> bool {
    in_bounds(p) && (p.x == 0 || p.y == 0 || p.x == GRID_WIDTH - 1 || p.y == GRID_HEIGHT - 1)
}

/// Even-odd ray cast; points exactly on an edge may land either way
pub fn point_in_polygon(point: Vec2, polygon: &[Vec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Integer rectangle overlap (positions are top-left corners)
#[inline]
pub fn aabb_overlap(a_pos: IVec2, a_size: IVec2, b_pos: IVec2, b_size: IVec2) -> bool {
    a_pos.x < b_pos.x + b_size.x
        && b_pos.x < a_pos.x + a_size.x
        && a_pos.y < b_pos.y + b_size.y
        && b_pos.y < a_pos.y + a_size.y
}

/// Continuous rectangle overlap, used by the evasion run
#[inline]
pub fn aabb_overlap_f(a_pos: Vec2, a_size: Vec2, b_pos: Vec2, b_size: Vec2) -> bool {
    a_pos.x < b_pos.x + b_size.x
        && b_pos.x < a_pos.x + a_size.x
        && a_pos.y < b_pos.y + b_size.y
        && b_pos.y < a_pos.y + a_size.y
}

/// Axis-dominant single step from `from` toward `to` (zero when equal)
pub fn step_toward(from: IVec2, to: IVec2) -> IVec2 {
    let delta = to - from;
    if delta == IVec2::ZERO {
        IVec2::ZERO
    } else if delta.x.abs() >= delta.y.abs() {
        IVec2::new(delta.x.signum(), 0)
    } else {
        IVec2::new(0, delta.y.signum())
    }
}

/// The secondary axis step toward `to`, for when the dominant one is blocked
pub fn secondary_step_toward(from: IVec2, to: IVec2) -> IVec2 {
    let delta = to - from;
    if delta.x.abs() >= delta.y.abs() {
        IVec2::new(0, delta.y.signum())
    } else {
        IVec2::new(delta.x.signum(), 0)
    }
}

/// Per-cell lookup of which wall (if any) covers a cell
#[derive(Debug, Clone)]
pub struct WallMap {
    cells: Vec<Option<u16>>,
}

impl WallMap {
    pub fn new(walls: &[Wall]) -> Self {
        let mut cells = vec![None; (GRID_WIDTH * GRID_HEIGHT) as usize];
        for (idx, wall) in walls.iter().enumerate() {
            for cell in wall.cells() {
                if in_bounds(cell) {
                    cells[(cell.y * GRID_WIDTH + cell.x) as usize] = Some(idx as u16);
                }
            }
        }
        Self { cells }
    }

    /// Index into the wall list of the wall covering `p`
    pub fn wall_index(&self, p: IVec2) -> Option<usize> {
        if !in_bounds(p) {
            return None;
        }
        self.cells[(p.y * GRID_WIDTH + p.x) as usize].map(usize::from)
    }

    pub fn wall_at<'a>(&self, walls: &'a [Wall], p: IVec2) -> Option<&'a Wall> {
        self.wall_index(p).and_then(|i| walls.get(i))
    }

    pub fn kind_at(&self, walls: &[Wall], p: IVec2) -> Option<WallKind> {
        self.wall_at(walls, p).map(|w| w.kind)
    }

    /// True for walls of any kind and for cells off the board
    pub fn is_blocked(&self, p: IVec2) -> bool {
        !in_bounds(p) || self.wall_index(p).is_some()
    }

    /// True if no wall covers any cell of the `size` square at `pos`
    pub fn area_clear(&self, pos: IVec2, size: IVec2) -> bool {
        (pos.y..pos.y + size.y).all(|y| (pos.x..pos.x + size.x).all(|x| !self.is_blocked(IVec2::new(x, y))))
    }
}
