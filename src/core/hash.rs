//! State Digests
//!
//! SHA-256 digests over normalized room state. Two replicas that have
//! converged produce the same digest, which makes divergence cheap to spot
//! in logs and tests.

use sha2::{Sha256, Digest};
use super::grid::Cell;

/// Digest output type (256 bits / 32 bytes)
pub type StateDigest = [u8; 32];

/// Deterministic hasher for room state.
///
/// Order of updates is part of the digest.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for room snapshots.
    pub fn for_room_state() -> Self {
        Self::new(b"P2P_SNAKE_ROOM_V1")
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i32 value (little-endian).
    #[inline]
    pub fn update_i32(&mut self, value: i32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a bool.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a length-prefixed string.
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.hasher.update(value.as_bytes());
    }

    /// Update with a grid cell.
    #[inline]
    pub fn update_cell(&mut self, cell: Cell) {
        self.update_i32(cell.x);
        self.update_i32(cell.y);
    }

    /// Finalize and get digest.
    pub fn finalize(self) -> StateDigest {
        self.hasher.finalize().into()
    }
}

/// Compute a room-state digest with a custom update function.
pub fn compute_state_digest<F>(f: F) -> StateDigest
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_room_state();
    f(&mut hasher);
    hasher.finalize()
}
