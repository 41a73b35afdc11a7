//! Collision Detection
//!
//! Cell-exact checks for a head moving onto a new cell.

use std::collections::BTreeMap;

use crate::core::grid::Cell;
use crate::game::events::EliminationCause;
use crate::game::state::{Participant, PeerId};

/// Does `body` contain `cell`?
#[inline]
pub fn body_contains(body: &[Cell], cell: Cell) -> bool {
    body.iter().any(|c| *c == cell)
}

/// Check whether moving `mover`'s head to `new_head` kills it.
///
/// Checks, in order: the board edge, the mover's own current body, then the
/// bodies of every other living participant as they stand right now (other
/// participants earlier in identity order have already moved this tick).
/// The first hit wins.
pub fn check_move(
    mover: &Participant,
    new_head: Cell,
    participants: &BTreeMap<PeerId, Participant>,
    grid_size: i32,
) -> Option<EliminationCause> {
    if !new_head.in_bounds(grid_size) {
        return Some(EliminationCause::Wall);
    }

    if body_contains(&mover.body, new_head) {
        return Some(EliminationCause::SelfCollision);
    }

    participants
        .values()
        .filter(|other| other.id != mover.id && other.alive)
        .find(|other| body_contains(&other.body, new_head))
        .map(|other| EliminationCause::Collision { other: other.id.clone() })
}
