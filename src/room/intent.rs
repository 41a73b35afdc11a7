//! Local Intent Publisher
//!
//! Turns a local direction request into a write of this peer's own intent
//! field. Nothing else in the document is touched.

use tracing::debug;

use crate::core::grid::Direction;
use crate::doc::document::Document;
use crate::doc::field::{FieldKey, FieldValue, Intent};
use crate::game::state::{Participant, PeerId};
use crate::room::session::SessionError;

/// Publish a direction request for `local`.
///
/// While the game runs, an exact reversal of the committed heading is
/// dropped and `Ok(false)` returned. Before the game starts any direction
/// goes through and becomes the initial heading.
pub fn publish_direction(
    doc: &mut Document,
    local: &PeerId,
    direction: Direction,
) -> Result<bool, SessionError> {
    let record = doc.participant(local).ok_or(SessionError::NotAdmitted)?;
    let round = record.round;

    if doc.running() && direction.is_reverse_of(record.direction) {
        debug!(peer = %local, ?direction, "Reversal ignored");
        return Ok(false);
    }

    doc.set(
        FieldKey::Intent(local.clone()),
        FieldValue::Intent(Intent { direction, round }),
    );
    Ok(true)
}

/// Heading the next tick will use for `record`.
///
/// An intent counts only if it was made against the record's current round.
/// While running, a reversal that slipped past the publisher (the owner had
/// not yet seen the latest committed heading) is ignored here as well.
pub fn effective_direction(record: &Participant, intent: Option<Intent>, running: bool) -> Direction {
    match intent {
        Some(i) if i.round == record.round => {
            if running && i.direction.is_reverse_of(record.direction) {
                record.direction
            } else {
                i.direction
            }
        }
        _ => record.direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PALETTE;

    fn admitted_doc(id: &PeerId) -> Document {
        let mut doc = Document::new(id.clone(), 16);
        doc.set(
            FieldKey::Participant(id.clone()),
            FieldValue::Participant(Participant::spawn(id.clone(), PALETTE[0], 0)),
        );
        doc
    }

    #[test]
    fn test_requires_admission() {
        let id = PeerId::new("a");
        let mut doc = Document::new(id.clone(), 16);
        assert!(matches!(
            publish_direction(&mut doc, &id, Direction::Left),
            Err(SessionError::NotAdmitted)
        ));
    }

    #[test]
    fn test_any_direction_before_start() {
        let id = PeerId::new("a");
        let mut doc = admitted_doc(&id);

        assert!(publish_direction(&mut doc, &id, Direction::Down).unwrap());
        assert_eq!(doc.intent(&id).map(|i| i.direction), Some(Direction::Down));
    }

    #[test]
    fn test_reversal_rejected_while_running() {
        let id = PeerId::new("a");
        let mut doc = admitted_doc(&id);
        doc.set(FieldKey::Running, FieldValue::Running(true));

        assert!(!publish_direction(&mut doc, &id, Direction::Down).unwrap());
        assert!(doc.intent(&id).is_none());
        assert!(publish_direction(&mut doc, &id, Direction::Left).unwrap());
    }

    #[test]
    fn test_only_own_intent_written() {
        let id = PeerId::new("a");
        let mut doc = admitted_doc(&id);
        let before = doc.participants();

        publish_direction(&mut doc, &id, Direction::Right).unwrap();

        assert_eq!(doc.participants(), before);
        assert!(doc.intent(&PeerId::new("b")).is_none());
    }

    #[test]
    fn test_effective_direction_rules() {
        let mut record = Participant::spawn(PeerId::new("a"), PALETTE[0], 2);
        record.direction = Direction::Up;

        let current = Intent { direction: Direction::Left, round: 2 };
        let stale = Intent { direction: Direction::Left, round: 1 };
        let reverse = Intent { direction: Direction::Down, round: 2 };

        assert_eq!(effective_direction(&record, None, true), Direction::Up);
        assert_eq!(effective_direction(&record, Some(current), true), Direction::Left);
        assert_eq!(effective_direction(&record, Some(stale), true), Direction::Up);
        assert_eq!(effective_direction(&record, Some(reverse), true), Direction::Up);
        assert_eq!(effective_direction(&record, Some(reverse), false), Direction::Down);
    }
}
