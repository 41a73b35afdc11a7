//! Authoritative Simulation Tick
//!
//! One step of the game on the authoritative peer. Pure: the caller hands
//! in a [`SimState`] built from the replicated document and writes the
//! mutated state back. No clocks, no I/O.

use std::collections::BTreeMap;

use crate::core::rng::DeterministicRng;
use crate::game::collision::check_move;
use crate::game::consumable::{self, ConsumableConfig};
use crate::game::events::{EliminationCause, GameEvent};
use crate::game::state::{
    ConsumableItem, EndReason, GameOutcome, Participant, PeerId, SimState,
};
use crate::GRID_SIZE;

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Items eaten this tick
    pub consumed: usize,
    /// Set on the tick that ended the game
    pub outcome: Option<GameOutcome>,
}

impl TickResult {
    /// Did the game end on this tick?
    pub fn game_ended(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Configuration for the simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Board edge length
    pub grid_size: i32,
    /// Item pool rules
    pub consumables: ConsumableConfig,
    /// Items placed when a game starts
    pub initial_items: usize,
    /// Chance (percent) that a starting item is beneficial
    pub initial_beneficial_percent: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: GRID_SIZE,
            consumables: ConsumableConfig::default(),
            initial_items: 3,
            initial_beneficial_percent: 60,
        }
    }
}

/// What happened to one participant this step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Moved one cell; carries the item eaten, if any
    Moved { eaten: Option<ConsumableItem> },
    /// Died; the body is left where it was
    Died(EliminationCause),
}

/// Advance one living participant by a single cell.
///
/// `others` must not contain `mover`. Shared by the two-player tick and
/// [`SoloGame`](crate::game::solo::SoloGame).
pub fn step_participant(
    mover: &mut Participant,
    others: &BTreeMap<PeerId, Participant>,
    consumables: &mut Vec<ConsumableItem>,
    grid_size: i32,
) -> StepOutcome {
    let Some(head) = mover.head() else {
        // Record arrived without a body; nothing to move
        return StepOutcome::Moved { eaten: None };
    };
    let new_head = head.step(mover.direction);

    if let Some(cause) = check_move(mover, new_head, others, grid_size) {
        mover.alive = false;
        return StepOutcome::Died(cause);
    }

    mover.body.insert(0, new_head);

    match consumables.iter().position(|c| c.position == new_head) {
        Some(index) => {
            let item = consumables.remove(index);
            mover.apply_score(item.kind.score_delta());
            StepOutcome::Moved { eaten: Some(item) }
        }
        None => {
            mover.body.pop();
            StepOutcome::Moved { eaten: None }
        }
    }
}

/// Run one simulation tick.
///
/// # Arguments
///
/// * `state` - Simulation state (mutated in place)
/// * `rng` - Round RNG for item placement
/// * `config` - Engine configuration
///
/// # Ordering
///
/// Participants move in ascending identity order (BTreeMap). Each one is
/// checked against the others as already mutated this tick, so the later
/// participant loses a head-on meeting.
///
/// Does nothing once `running` is false, so end-of-game effects fire once.
pub fn tick(state: &mut SimState, rng: &mut DeterministicRng, config: &EngineConfig) -> TickResult {
    let mut result = TickResult::default();

    if !state.running {
        return result;
    }

    // 0. Advance tick counter
    state.tick += 1;

    // 1. Move every living participant
    move_participants(state, config, &mut result);

    // 2. Top up the item pool
    let added = consumable::replenish(
        state,
        rng,
        &config.consumables,
        config.grid_size,
        result.consumed > 0,
    );
    for item in added {
        result.events.push(GameEvent::spawned(state.tick, item.id, item.kind, item.position));
    }

    // 3. Check end condition
    check_end_condition(state, &mut result);

    result
}

fn move_participants(state: &mut SimState, config: &EngineConfig, result: &mut TickResult) {
    let ids: Vec<PeerId> = state.participants.keys().cloned().collect();

    for id in ids {
        // Take the mover out so the map holds only the others
        let Some(mut mover) = state.participants.remove(&id) else {
            continue;
        };

        if mover.alive {
            let outcome = step_participant(
                &mut mover,
                &state.participants,
                &mut state.consumables,
                config.grid_size,
            );

            #[cfg(feature = "debug-tracing")]
            tracing::trace!(tick = state.tick, participant = %id, ?outcome, body = ?mover.body, "step");

            match outcome {
                StepOutcome::Moved { eaten: Some(item) } => {
                    result.consumed += 1;
                    result.events.push(GameEvent::consumed(
                        state.tick,
                        id.clone(),
                        item.id,
                        item.kind,
                        mover.score,
                    ));
                }
                StepOutcome::Moved { eaten: None } => {}
                StepOutcome::Died(cause) => {
                    result.events.push(GameEvent::eliminated(
                        state.tick,
                        id.clone(),
                        cause,
                        mover.score,
                    ));
                }
            }
        }

        state.participants.insert(id, mover);
    }
}

fn check_end_condition(state: &mut SimState, result: &mut TickResult) {
    if state.alive_count() > 1 {
        return;
    }

    state.running = false;
    let outcome = decide_outcome(&state.participants);
    result.events.push(GameEvent::ended(state.tick, outcome.clone()));
    result.outcome = Some(outcome);
}

/// Pick the winner of a finished game.
///
/// The sole survivor wins. With nobody alive the strictly higher score wins,
/// ties going to the first participant in identity order.
pub fn decide_outcome(participants: &BTreeMap<PeerId, Participant>) -> GameOutcome {
    let scores: BTreeMap<PeerId, u32> = participants
        .iter()
        .map(|(id, p)| (id.clone(), p.score))
        .collect();

    let alive: Vec<&PeerId> = participants
        .values()
        .filter(|p| p.alive)
        .map(|p| &p.id)
        .collect();

    if let [survivor] = alive.as_slice() {
        return GameOutcome {
            winner: Some((*survivor).clone()),
            reason: EndReason::LastSurvivor,
            scores,
        };
    }

    // Keeps the earlier entry on equal scores
    let mut best: Option<(&PeerId, u32)> = None;
    let mut tied = false;
    for (id, score) in &scores {
        match best {
            Some((_, top)) if *score > top => {
                best = Some((id, *score));
                tied = false;
            }
            Some((_, top)) if *score == top => tied = true,
            Some(_) => {}
            None => best = Some((id, *score)),
        }
    }

    GameOutcome {
        winner: best.map(|(id, _)| id.clone()),
        reason: if tied { EndReason::Tiebreak } else { EndReason::HigherScore },
        scores,
    }
}

/// Begin a game: fresh item pool, running on.
///
/// Participants left over from a finished game are put back on their spawn
/// cells first.
pub fn start_round(
    state: &mut SimState,
    rng: &mut DeterministicRng,
    config: &EngineConfig,
    round: u32,
) -> Vec<GameEvent> {
    if state.participants.values().any(|p| !p.alive) {
        reset_round(state, round);
    }

    state.tick = 0;
    state.consumables.clear();

    let initial = ConsumableConfig {
        beneficial_percent: config.initial_beneficial_percent,
        ceiling: config.initial_items.max(config.consumables.ceiling),
        guarantee_beneficial: false,
        ..config.consumables.clone()
    };
    let added = consumable::spawn_batch(state, rng, &initial, config.grid_size, config.initial_items);

    state.running = true;

    let mut events = vec![GameEvent::started(0, state.participants.keys().cloned().collect())];
    events.extend(
        added
            .into_iter()
            .map(|item| GameEvent::spawned(0, item.id, item.kind, item.position)),
    );
    events
}

/// Put every participant back on its spawn cell and stop the game.
///
/// Idempotent apart from the round number.
pub fn reset_round(state: &mut SimState, round: u32) {
    for participant in state.participants.values_mut() {
        participant.reset(round);
    }
    state.consumables.clear();
    state.running = false;
    state.tick = 0;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::{Cell, Direction};
    use crate::game::events::GameEventData;
    use crate::game::state::{ItemKind, PALETTE};
    use proptest::prelude::*;

    fn participant(id: &str, body: &[(i32, i32)], direction: Direction) -> Participant {
        Participant {
            body: body.iter().map(|&c| Cell::from(c)).collect(),
            direction,
            ..Participant::spawn(PeerId::new(id), PALETTE[0], 0)
        }
    }

    fn running(participants: Vec<Participant>) -> SimState {
        let mut state = SimState::new();
        for p in participants {
            state.add_participant(p);
        }
        state.running = true;
        state
    }

    /// Config that never spawns items, so tests control the board.
    fn quiet_config() -> EngineConfig {
        EngineConfig {
            consumables: ConsumableConfig {
                floor: 0,
                ceiling: 0,
                ..ConsumableConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn body(state: &SimState, id: &str) -> Vec<Cell> {
        state.participants[&PeerId::new(id)].body.clone()
    }

    #[test]
    fn test_move_and_eat() {
        let config = quiet_config();
        let mut rng = DeterministicRng::new(1);
        let mut state = running(vec![
            participant("a", &[(10, 10)], Direction::Up),
            participant("b", &[(2, 2)], Direction::Down),
        ]);

        tick(&mut state, &mut rng, &config);
        assert_eq!(body(&state, "a"), vec![Cell::new(10, 9)]);
        assert!(state.participants[&PeerId::new("a")].alive);

        state.consumables.push(ConsumableItem::new("g", Cell::new(10, 8), ItemKind::Beneficial));
        let result = tick(&mut state, &mut rng, &config);

        assert_eq!(body(&state, "a"), vec![Cell::new(10, 8), Cell::new(10, 9)]);
        assert_eq!(state.participants[&PeerId::new("a")].score, 10);
        assert!(state.consumables.is_empty());
        assert_eq!(result.consumed, 1);
    }

    #[test]
    fn test_harmful_item_clamps_and_grows() {
        let config = quiet_config();
        let mut rng = DeterministicRng::new(1);
        let mut state = running(vec![
            participant("a", &[(5, 5)], Direction::Right),
            participant("b", &[(2, 15)], Direction::Up),
        ]);
        state.consumables.push(ConsumableItem::new("r", Cell::new(6, 5), ItemKind::Harmful));

        tick(&mut state, &mut rng, &config);

        let a = &state.participants[&PeerId::new("a")];
        assert_eq!(a.score, 0);
        assert_eq!(a.body.len(), 2);
    }

    #[test]
    fn test_wall_deaths() {
        let config = quiet_config();
        let mut rng = DeterministicRng::new(1);
        let mut state = running(vec![
            participant("a", &[(GRID_SIZE - 1, 4)], Direction::Right),
            participant("b", &[(0, 12)], Direction::Left),
            participant("c", &[(8, 8)], Direction::Up),
        ]);

        let result = tick(&mut state, &mut rng, &config);

        assert!(!state.participants[&PeerId::new("a")].alive);
        assert!(!state.participants[&PeerId::new("b")].alive);
        // Frozen where they died
        assert_eq!(body(&state, "a"), vec![Cell::new(GRID_SIZE - 1, 4)]);
        assert_eq!(body(&state, "b"), vec![Cell::new(0, 12)]);
        assert!(result.events.iter().any(|e| matches!(
            &e.data,
            GameEventData::ParticipantEliminated { cause: EliminationCause::Wall, .. }
        )));
        assert_eq!(result.outcome.and_then(|o| o.winner), Some(PeerId::new("c")));
    }

    #[test]
    fn test_later_participant_loses_head_on() {
        let config = quiet_config();
        let mut rng = DeterministicRng::new(1);
        // a moves into (5,5) first; b then targets the same cell
        let mut state = running(vec![
            participant("a", &[(5, 6)], Direction::Up),
            participant("b", &[(4, 5)], Direction::Right),
            participant("c", &[(15, 15)], Direction::Up),
        ]);

        tick(&mut state, &mut rng, &config);

        let a = &state.participants[&PeerId::new("a")];
        let b = &state.participants[&PeerId::new("b")];
        assert!(a.alive);
        assert_eq!(a.body, vec![Cell::new(5, 5)]);
        assert!(!b.alive);
        assert_eq!(b.body, vec![Cell::new(4, 5)]);
    }

    #[test]
    fn test_simultaneous_death_higher_score_wins() {
        let config = quiet_config();
        let mut rng = DeterministicRng::new(1);
        let mut a = participant("a", &[(0, 3)], Direction::Left);
        a.score = 30;
        let mut b = participant("b", &[(GRID_SIZE - 1, 3)], Direction::Right);
        b.score = 45;
        let mut state = running(vec![a, b]);

        let result = tick(&mut state, &mut rng, &config);
        let outcome = result.outcome.clone().unwrap();
        assert_eq!(outcome.winner, Some(PeerId::new("b")));
        assert_eq!(outcome.reason, EndReason::HigherScore);
        assert_eq!(outcome.winning_score(), Some(45));
        assert!(!state.running);

        // Guarded: a second tick does nothing
        let again = tick(&mut state, &mut rng, &config);
        assert!(again.events.is_empty());
        assert!(!again.game_ended());
    }

    #[test]
    fn test_tie_goes_to_first_in_order() {
        let mut all = BTreeMap::new();
        for id in ["b", "a"] {
            let mut p = participant(id, &[(1, 1)], Direction::Up);
            p.alive = false;
            p.score = 20;
            all.insert(p.id.clone(), p);
        }
        let outcome = decide_outcome(&all);
        assert_eq!(outcome.winner, Some(PeerId::new("a")));
        assert_eq!(outcome.reason, EndReason::Tiebreak);
    }

    #[test]
    fn test_replenish_after_consumption() {
        let config = EngineConfig::default();
        let mut rng = DeterministicRng::new(3);
        let mut state = running(vec![
            participant("a", &[(10, 10)], Direction::Up),
            participant("b", &[(3, 3)], Direction::Down),
        ]);
        state.consumables = vec![
            ConsumableItem::new("1", Cell::new(10, 9), ItemKind::Beneficial),
            ConsumableItem::new("2", Cell::new(0, 19), ItemKind::Harmful),
            ConsumableItem::new("3", Cell::new(19, 0), ItemKind::Harmful),
            ConsumableItem::new("4", Cell::new(19, 19), ItemKind::Harmful),
        ];

        let result = tick(&mut state, &mut rng, &config);

        assert_eq!(result.consumed, 1);
        // Pool was at 3 after the meal; replenish tops it up to the ceiling
        assert_eq!(state.consumables.len(), config.consumables.ceiling);
    }

    #[test]
    fn test_tick_determinism() {
        let config = EngineConfig::default();
        let build = || {
            let mut state = SimState::new();
            state.add_participant(Participant::spawn(PeerId::new("a"), PALETTE[0], 0));
            state.add_participant(Participant::spawn(PeerId::new("b"), PALETTE[1], 0));
            state
        };
        let mut s1 = build();
        let mut s2 = build();
        let mut r1 = DeterministicRng::new(77);
        let mut r2 = DeterministicRng::new(77);
        start_round(&mut s1, &mut r1, &config, 0);
        start_round(&mut s2, &mut r2, &config, 0);

        for _ in 0..30 {
            tick(&mut s1, &mut r1, &config);
            tick(&mut s2, &mut r2, &config);
        }
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_start_seeds_items_and_revives() {
        let config = EngineConfig::default();
        let mut rng = DeterministicRng::new(11);
        let mut state = SimState::new();
        let mut a = Participant::spawn(PeerId::new("a"), PALETTE[0], 0);
        a.alive = false;
        state.add_participant(a);
        state.add_participant(Participant::spawn(PeerId::new("b"), PALETTE[1], 0));

        let events = start_round(&mut state, &mut rng, &config, 1);

        assert!(state.running);
        assert_eq!(state.consumables.len(), 3);
        assert!(state.participants.values().all(|p| p.alive && p.round == 1));
        assert!(matches!(events[0].data, GameEventData::GameStarted { .. }));
    }

    #[test]
    fn test_reset_twice_equals_once() {
        let mut state = running(vec![
            participant("a", &[(3, 3), (3, 4)], Direction::Left),
            participant("b", &[(9, 9)], Direction::Down),
        ]);
        state.consumables.push(ConsumableItem::new("x", Cell::new(1, 1), ItemKind::Harmful));

        reset_round(&mut state, 1);
        let once = state.clone();
        reset_round(&mut state, 1);
        assert_eq!(state, once);
        assert!(!state.running);
        assert!(state.consumables.is_empty());
    }

    proptest! {
        #[test]
        fn prop_body_length_rule(
            ax in 0i32..GRID_SIZE, ay in 0i32..GRID_SIZE,
            bx in 0i32..GRID_SIZE, by in 0i32..GRID_SIZE,
            da in 0usize..4, db in 0usize..4,
            items in proptest::collection::vec((0i32..GRID_SIZE, 0i32..GRID_SIZE, any::<bool>()), 0..6),
        ) {
            prop_assume!((ax, ay) != (bx, by));
            let mut state = running(vec![
                participant("a", &[(ax, ay)], Direction::ALL[da]),
                participant("b", &[(bx, by)], Direction::ALL[db]),
            ]);
            for (i, (x, y, good)) in items.into_iter().enumerate() {
                let cell = Cell::new(x, y);
                if state.is_cell_taken(cell) {
                    continue;
                }
                let kind = if good { ItemKind::Beneficial } else { ItemKind::Harmful };
                state.consumables.push(ConsumableItem::new(format!("i{i}"), cell, kind));
            }
            let before = state.clone();
            let mut rng = DeterministicRng::new(0);

            let result = tick(&mut state, &mut rng, &EngineConfig::default());

            for (id, prev) in &before.participants {
                let now = &state.participants[id];
                let ate = result.events.iter().any(|e| matches!(
                    &e.data,
                    GameEventData::ItemConsumed { participant, .. } if participant == id
                ));
                if !now.alive {
                    prop_assert_eq!(&now.body, &prev.body);
                } else if ate {
                    prop_assert_eq!(now.body.len(), prev.body.len() + 1);
                } else {
                    prop_assert_eq!(now.body.len(), prev.body.len());
                }
            }
            prop_assert!(state.consumables.len() <= 5);
        }
    }
}
