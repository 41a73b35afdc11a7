//! Core deterministic primitives.
//!
//! Grid geometry, the seeded RNG and state digests. Nothing here touches
//! the network or the clock.

pub mod grid;
pub mod rng;
pub mod hash;

pub use grid::{Cell, Direction};
pub use rng::DeterministicRng;
pub use hash::{compute_state_digest, StateDigest};
