//! Grid Cells and Directions
//!
//! Integer grid primitives for the snake board.
//! The board is `GRID_SIZE × GRID_SIZE`, origin top-left, `y` grows downwards.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::GRID_SIZE;

// =============================================================================
// CELL
// =============================================================================

/// A grid cell.
///
/// Ordered (x, then y) so cells can live in sorted collections.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Cell {
    /// Create a cell.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Board centre, where the single-player snake starts.
    pub const SPAWN: Self = Self { x: GRID_SIZE / 2, y: GRID_SIZE / 2 };

    /// The neighbouring cell one step along `dir`.
    ///
    /// May leave the board; check with [`Cell::in_bounds`].
    #[inline]
    pub fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.vector();
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Is this cell inside `[0, size) × [0, size)`?
    #[inline]
    pub fn in_bounds(self, size: i32) -> bool {
        self.x >= 0 && self.x < size && self.y >= 0 && self.y < size
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Cell {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

// =============================================================================
// DIRECTION
// =============================================================================

/// One of the four unit movement vectors.
///
/// There is no zero direction: a snake always has a heading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// `(0, -1)`
    #[default]
    Up,
    /// `(0, 1)`
    Down,
    /// `(-1, 0)`
    Left,
    /// `(1, 0)`
    Right,
}

impl Direction {
    /// All directions, in a fixed order.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    /// Unit vector `(dx, dy)`.
    #[inline]
    pub const fn vector(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Parse a unit vector. Anything else (including zero) is rejected.
    pub fn from_vector(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }

    /// The exact opposite heading.
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Is `other` a 180° turn from `self`?
    #[inline]
    pub fn is_reverse_of(self, other: Direction) -> bool {
        self.opposite() == other
    }

    /// Map a keyboard key name (DOM `KeyboardEvent.key` style) to a direction.
    ///
    /// Arrow keys and WASD, case-insensitive for letters.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Direction::Up),
            "ArrowDown" => Some(Direction::Down),
            "ArrowLeft" => Some(Direction::Left),
            "ArrowRight" => Some(Direction::Right),
            k if k.eq_ignore_ascii_case("w") => Some(Direction::Up),
            k if k.eq_ignore_ascii_case("s") => Some(Direction::Down),
            k if k.eq_ignore_ascii_case("a") => Some(Direction::Left),
            k if k.eq_ignore_ascii_case("d") => Some(Direction::Right),
            _ => None,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_and_bounds() {
        let edge = Cell::new(GRID_SIZE - 1, 4);
        assert!(edge.in_bounds(GRID_SIZE));
        assert!(!edge.step(Direction::Right).in_bounds(GRID_SIZE));

        let origin = Cell::new(0, 4);
        assert!(!origin.step(Direction::Left).in_bounds(GRID_SIZE));
        assert_eq!(origin.step(Direction::Down), Cell::new(0, 5));
    }

    #[test]
    fn test_spawn_is_centre() {
        assert_eq!(Cell::SPAWN, Cell::new(10, 10));
    }

    #[test]
    fn test_vector_round_trip() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.vector();
            assert_eq!(Direction::from_vector(dx, dy), Some(dir));
        }
        assert_eq!(Direction::from_vector(0, 0), None);
        assert_eq!(Direction::from_vector(1, 1), None);
    }

    #[test]
    fn test_opposites() {
        assert!(Direction::Up.is_reverse_of(Direction::Down));
        assert!(Direction::Left.is_reverse_of(Direction::Right));
        assert!(!Direction::Up.is_reverse_of(Direction::Left));
        assert!(!Direction::Up.is_reverse_of(Direction::Up));
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Direction::from_key("ArrowLeft"), Some(Direction::Left));
        assert_eq!(Direction::from_key("W"), Some(Direction::Up));
        assert_eq!(Direction::from_key("d"), Some(Direction::Right));
        assert_eq!(Direction::from_key("Enter"), None);
    }
}
