//! Deterministic Random Number Generator
//!
//! xoroshiro128+ (rotation/shift constants 24, 16, 37) seeded through
//! SplitMix64.
//! Item placement and kinds are drawn from here so that a given seed and
//! document state always produce the same tick.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::grid::Cell;

/// Deterministic PRNG with 128 bits of state.
///
/// # Example
///
/// ```
/// use p2p_snake::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // All-zero state would be a fixed point
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create the RNG an authoritative peer uses for one round of a room.
    pub fn for_round(room_id: &str, authority: &str, round: u32) -> Self {
        Self::new(derive_round_seed(room_id, authority, round))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in `[0, max)`. Returns 0 when `max == 0`.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in `[min, max]`.
    #[inline]
    pub fn next_int_range(&mut self, min: u32, max: u32) -> u32 {
        if min >= max {
            return min;
        }
        min + self.next_int(max - min + 1)
    }

    /// `true` with probability `percent / 100`.
    #[inline]
    pub fn chance(&mut self, percent: u32) -> bool {
        self.next_int(100) < percent
    }

    /// Uniformly random cell on a `size × size` board.
    #[inline]
    pub fn random_cell(&mut self, size: i32) -> Cell {
        let size = size.max(0) as u32;
        let x = self.next_int(size) as i32;
        let y = self.next_int(size) as i32;
        Cell::new(x, y)
    }
}

/// SplitMix64 for seed initialization.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive the seed for one round of a room.
///
/// Mixing in the round keeps item layouts from repeating after a reset.
pub fn derive_round_seed(room_id: &str, authority: &str, round: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"P2P_SNAKE_SEED_V1");
    hasher.update((room_id.len() as u32).to_le_bytes());
    hasher.update(room_id.as_bytes());
    hasher.update((authority.len() as u32).to_le_bytes());
    hasher.update(authority.as_bytes());
    hasher.update(round.to_le_bytes());

    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash[0..8]);
    u64::from_le_bytes(seed)
}

// =============================================================================
// TESTS
// =============================================================================
