//! Consumable Spawning
//!
//! Item pool replenishment driven by the deterministic RNG.

use crate::core::grid::Cell;
use crate::core::rng::DeterministicRng;
use crate::game::state::{ConsumableItem, ItemKind, SimState};

/// Configuration for item spawning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumableConfig {
    /// Replenish when the pool is smaller than this
    pub floor: usize,
    /// Never hold more than this many items
    pub ceiling: usize,
    /// Smallest batch generated per replenish
    pub batch_min: u32,
    /// Largest batch generated per replenish
    pub batch_max: u32,
    /// Chance (percent) that a new item is beneficial
    pub beneficial_percent: u32,
    /// Placement retries before an item is skipped
    pub max_attempts: u32,
    /// Force the first item of each batch to be beneficial
    pub guarantee_beneficial: bool,
}

impl Default for ConsumableConfig {
    fn default() -> Self {
        Self {
            floor: 3,
            ceiling: 5,
            batch_min: 2,
            batch_max: 4,
            beneficial_percent: 70,
            max_attempts: 100,
            guarantee_beneficial: false,
        }
    }
}

impl ConsumableConfig {
    /// Spawning rules for single-player games.
    pub fn solo() -> Self {
        Self {
            batch_max: 5,
            beneficial_percent: 60,
            guarantee_beneficial: true,
            ..Self::default()
        }
    }
}

/// Top up the pool if it fell under the floor or anything was eaten.
///
/// Returns the items added this call.
pub fn replenish(
    state: &mut SimState,
    rng: &mut DeterministicRng,
    config: &ConsumableConfig,
    grid_size: i32,
    consumed_any: bool,
) -> Vec<ConsumableItem> {
    if state.consumables.len() >= config.floor && !consumed_any {
        return Vec::new();
    }

    let batch = rng.next_int_range(config.batch_min, config.batch_max) as usize;
    spawn_batch(state, rng, config, grid_size, batch)
}

/// Place up to `count` new items, never exceeding the ceiling.
///
/// An item whose placement runs out of attempts is skipped.
pub fn spawn_batch(
    state: &mut SimState,
    rng: &mut DeterministicRng,
    config: &ConsumableConfig,
    grid_size: i32,
    count: usize,
) -> Vec<ConsumableItem> {
    let room = config.ceiling.saturating_sub(state.consumables.len());
    let count = count.min(room);
    let mut added = Vec::with_capacity(count);
    let mut need_beneficial = config.guarantee_beneficial;

    for _ in 0..count {
        let Some(position) = find_free_cell(state, rng, grid_size, config.max_attempts) else {
            continue;
        };

        let kind = if need_beneficial {
            ItemKind::Beneficial
        } else {
            roll_kind(rng, config.beneficial_percent)
        };
        need_beneficial = false;

        let item = ConsumableItem::new(next_item_id(rng), position, kind);
        state.consumables.push(item.clone());
        added.push(item);
    }

    added
}

/// Draw random cells until one is free of living bodies and items.
pub fn find_free_cell(
    state: &SimState,
    rng: &mut DeterministicRng,
    grid_size: i32,
    max_attempts: u32,
) -> Option<Cell> {
    (0..max_attempts)
        .map(|_| rng.random_cell(grid_size))
        .find(|cell| !state.is_cell_taken(*cell))
}

/// Pick an item kind with the given beneficial weighting.
#[inline]
pub fn roll_kind(rng: &mut DeterministicRng, beneficial_percent: u32) -> ItemKind {
    if rng.chance(beneficial_percent) {
        ItemKind::Beneficial
    } else {
        ItemKind::Harmful
    }
}

fn next_item_id(rng: &mut DeterministicRng) -> String {
    format!("item-{:016x}", rng.next_u64())
}
