//! Single-Player Game
//!
//! One snake, no peers, no document. Uses the same per-participant step as
//! the two-player tick, minus the inter-participant check.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::core::grid::{Cell, Direction};
use crate::core::rng::DeterministicRng;
use crate::game::consumable::{self, ConsumableConfig};
use crate::game::events::GameEvent;
use crate::game::state::{ConsumableItem, Participant, PeerId, SimState, PALETTE};
use crate::game::tick::{step_participant, StepOutcome, TickResult};
use crate::GRID_SIZE;

/// Speed presets, slowest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speed {
    /// 0.5X
    Half,
    /// Low 1X
    #[default]
    Normal,
    /// 2X
    Double,
    /// 3X
    Triple,
    /// 4X
    Quadruple,
    /// 5X
    Quintuple,
}

impl Speed {
    /// All presets, slowest first.
    pub const ALL: [Speed; 6] = [
        Speed::Half,
        Speed::Normal,
        Speed::Double,
        Speed::Triple,
        Speed::Quadruple,
        Speed::Quintuple,
    ];

    /// Tick period for this preset.
    pub fn period(self) -> Duration {
        Duration::from_millis(match self {
            Speed::Half => 200,
            Speed::Normal => 120,
            Speed::Double => 90,
            Speed::Triple => 60,
            Speed::Quadruple => 40,
            Speed::Quintuple => 25,
        })
    }

    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            Speed::Half => "0.5X",
            Speed::Normal => "Low 1X",
            Speed::Double => "2X",
            Speed::Triple => "3X",
            Speed::Quadruple => "4X",
            Speed::Quintuple => "5X",
        }
    }

    /// Parse a menu label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.label() == label)
    }
}

/// A single-player game.
#[derive(Clone, Debug)]
pub struct SoloGame {
    state: SimState,
    id: PeerId,
    rng: DeterministicRng,
    config: ConsumableConfig,
    speed: Speed,
    started: bool,
    game_over: bool,
}

impl SoloGame {
    /// Create a stopped game.
    pub fn new(seed: u64) -> Self {
        let id = PeerId::new("solo");
        let mut state = SimState::new();
        state.add_participant(Self::fresh_snake(&id));
        Self {
            state,
            id,
            rng: DeterministicRng::new(seed),
            config: ConsumableConfig {
                floor: 1,
                ..ConsumableConfig::solo()
            },
            speed: Speed::default(),
            started: false,
            game_over: false,
        }
    }

    fn fresh_snake(id: &PeerId) -> Participant {
        Participant {
            body: vec![Cell::SPAWN],
            ..Participant::spawn(id.clone(), PALETTE[0], 0)
        }
    }

    /// The snake.
    pub fn snake(&self) -> Option<&Participant> {
        self.state.participants.get(&self.id)
    }

    /// Items on the board.
    pub fn items(&self) -> &[ConsumableItem] {
        &self.state.consumables
    }

    /// Current score.
    pub fn score(&self) -> u32 {
        self.snake().map(|s| s.score).unwrap_or(0)
    }

    /// Is the game ticking?
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Did the snake die?
    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// Current speed preset.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Change the speed preset. Takes effect on the next scheduled tick.
    pub fn set_speed(&mut self, speed: Speed) {
        self.speed = speed;
    }

    /// Start a fresh game, or resume a paused one.
    pub fn start(&mut self) {
        if self.game_over || !self.started {
            self.reset();
            self.started = true;
        }
        self.state.running = true;
        self.fill_empty_board();
    }

    /// Pause a running game, or resume a paused one.
    pub fn toggle_pause(&mut self) {
        if self.game_over || !self.started {
            return;
        }
        self.state.running = !self.state.running;
    }

    /// Back to the initial stopped state.
    pub fn reset(&mut self) {
        self.state.participants.insert(self.id.clone(), Self::fresh_snake(&self.id));
        self.state.consumables.clear();
        self.state.running = false;
        self.state.tick = 0;
        self.started = false;
        self.game_over = false;
    }

    /// Request a heading.
    ///
    /// A fresh game (never started, or over) takes any direction and starts.
    /// Otherwise an exact reversal is ignored, paused or not; any other
    /// direction resumes a paused game. Returns whether the heading was applied.
    pub fn set_direction(&mut self, direction: Direction) -> bool {
        let fresh = !self.started || self.game_over;
        if !fresh
            && self
                .snake()
                .map(|s| s.direction.is_reverse_of(direction))
                .unwrap_or(true)
        {
            return false;
        }
        if !self.state.running {
            self.start();
        }

        match self.state.participants.get_mut(&self.id) {
            Some(snake) => {
                snake.direction = direction;
                true
            }
            None => false,
        }
    }

    /// Handle a key name. Returns whether it was a game key.
    pub fn handle_key(&mut self, key: &str) -> bool {
        match Direction::from_key(key) {
            Some(direction) => {
                self.set_direction(direction);
                true
            }
            None => false,
        }
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickResult {
        let mut result = TickResult::default();
        if !self.state.running {
            return result;
        }

        self.state.tick += 1;
        let tick = self.state.tick;

        let Some(mut snake) = self.state.participants.remove(&self.id) else {
            return result;
        };
        let outcome = step_participant(
            &mut snake,
            &BTreeMap::new(),
            &mut self.state.consumables,
            GRID_SIZE,
        );
        let score = snake.score;
        self.state.participants.insert(self.id.clone(), snake);

        match outcome {
            StepOutcome::Died(cause) => {
                self.state.running = false;
                self.game_over = true;
                result.events.push(GameEvent::eliminated(tick, self.id.clone(), cause, score));
            }
            StepOutcome::Moved { eaten } => {
                if let Some(item) = eaten {
                    result.consumed = 1;
                    result.events.push(GameEvent::consumed(tick, self.id.clone(), item.id, item.kind, score));
                }
                let added = consumable::replenish(
                    &mut self.state,
                    &mut self.rng,
                    &self.config,
                    GRID_SIZE,
                    result.consumed > 0,
                );
                for item in added {
                    result.events.push(GameEvent::spawned(tick, item.id, item.kind, item.position));
                }
            }
        }

        result
    }

    fn fill_empty_board(&mut self) {
        if self.state.consumables.is_empty() {
            let count = self.rng.next_int_range(self.config.batch_min, self.config.batch_max) as usize;
            consumable::spawn_batch(&mut self.state, &mut self.rng, &self.config, GRID_SIZE, count);
        }
    }
}
