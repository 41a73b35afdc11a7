//! Replicated Room Document
//!
//! A map of independently mergeable fields. Every write is stamped with a
//! Lamport counter; replicas that have seen the same set of updates hold the
//! same values regardless of delivery order.
//!
//! Change notifications go out on a tokio broadcast channel for both local
//! and remote mutations. Readers re-read whatever fields they care about;
//! typed readers default anything missing or malformed.

use std::collections::BTreeMap;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::doc::field::{DocUpdate, FieldKey, FieldValue, Intent, MergePolicy, Stamp};
use crate::game::state::{ConsumableItem, GameOutcome, Participant, PeerId};

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Written by this replica
    Local,
    /// Applied from the partner
    Remote,
}

/// Notification for one field change.
#[derive(Clone, Debug)]
pub struct DocChange {
    /// Local or remote write
    pub origin: Origin,
    /// The winning update now stored
    pub update: DocUpdate,
}

#[derive(Clone, Debug)]
struct Entry {
    stamp: Stamp,
    value: FieldValue,
}

/// One replica of the room document.
pub struct Document {
    replica: PeerId,
    clock: u64,
    fields: BTreeMap<FieldKey, Entry>,
    changes: broadcast::Sender<DocChange>,
}

impl Document {
    /// Create an empty replica.
    ///
    /// `capacity` bounds the notification backlog per subscriber.
    pub fn new(replica: PeerId, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            replica,
            clock: 0,
            fields: BTreeMap::new(),
            changes,
        }
    }

    /// This replica's identity.
    pub fn replica(&self) -> &PeerId {
        &self.replica
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.changes.subscribe()
    }

    /// Raw field value.
    pub fn get(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key).map(|e| &e.value)
    }

    /// Number of stored fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Is the document empty?
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Write a field locally. Returns the stamped update to send to the partner.
    pub fn set(&mut self, key: FieldKey, value: FieldValue) -> DocUpdate {
        self.clock += 1;
        let update = DocUpdate {
            key,
            stamp: Stamp::new(self.clock, self.replica.clone()),
            value,
        };
        self.store(update.clone(), Origin::Local);
        update
    }

    /// Write a field only if nobody has written it yet.
    pub fn set_if_absent(&mut self, key: FieldKey, value: FieldValue) -> Option<DocUpdate> {
        if self.fields.contains_key(&key) {
            return None;
        }
        Some(self.set(key, value))
    }

    /// Merge an update from the partner.
    ///
    /// Returns whether it changed the stored value.
    pub fn apply(&mut self, update: DocUpdate) -> bool {
        if !update.value.fits(&update.key) {
            warn!(key = %update.key, "Dropping malformed document update");
            return false;
        }

        self.clock = self.clock.max(update.stamp.counter);

        let wins = match self.fields.get(&update.key) {
            None => true,
            Some(current) => match update.key.policy() {
                MergePolicy::LastWriterWins => update.stamp > current.stamp,
                MergePolicy::FirstWriterWins => update.stamp < current.stamp,
            },
        };

        if !wins {
            debug!(key = %update.key, counter = update.stamp.counter, "Stale update ignored");
            return false;
        }

        self.store(update, Origin::Remote);
        true
    }

    /// Merge a batch of updates. Returns how many changed the document.
    pub fn apply_all(&mut self, updates: impl IntoIterator<Item = DocUpdate>) -> usize {
        updates.into_iter().filter(|u| self.apply(u.clone())).count()
    }

    /// Every stored field as an update, for syncing a fresh partner.
    pub fn encode_state(&self) -> Vec<DocUpdate> {
        self.fields
            .iter()
            .map(|(key, entry)| DocUpdate {
                key: key.clone(),
                stamp: entry.stamp.clone(),
                value: entry.value.clone(),
            })
            .collect()
    }

    fn store(&mut self, update: DocUpdate, origin: Origin) {
        self.fields.insert(
            update.key.clone(),
            Entry {
                stamp: update.stamp.clone(),
                value: update.value.clone(),
            },
        );
        // No subscribers is fine
        let _ = self.changes.send(DocChange { origin, update });
    }

    // =========================================================================
    // TYPED READERS
    // =========================================================================

    /// All participant records, in identity order.
    pub fn participants(&self) -> BTreeMap<PeerId, Participant> {
        self.fields
            .values()
            .filter_map(|e| match &e.value {
                FieldValue::Participant(p) => Some((p.id.clone(), p.clone())),
                _ => None,
            })
            .collect()
    }

    /// One participant record.
    pub fn participant(&self, id: &PeerId) -> Option<&Participant> {
        match self.get(&FieldKey::Participant(id.clone())) {
            Some(FieldValue::Participant(p)) => Some(p),
            _ => None,
        }
    }

    /// A participant's latest direction request.
    pub fn intent(&self, id: &PeerId) -> Option<Intent> {
        match self.get(&FieldKey::Intent(id.clone())) {
            Some(FieldValue::Intent(i)) => Some(*i),
            _ => None,
        }
    }

    /// Item pool, empty if unset.
    pub fn consumables(&self) -> Vec<ConsumableItem> {
        match self.get(&FieldKey::Consumables) {
            Some(FieldValue::Consumables(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Running flag, false if unset.
    pub fn running(&self) -> bool {
        matches!(self.get(&FieldKey::Running), Some(FieldValue::Running(true)))
    }

    /// Authoritative identity, if elected.
    pub fn authority(&self) -> Option<&PeerId> {
        match self.get(&FieldKey::Authority) {
            Some(FieldValue::Authority(id)) => Some(id),
            _ => None,
        }
    }

    /// Result of the last finished game.
    pub fn outcome(&self) -> Option<&GameOutcome> {
        match self.get(&FieldKey::Outcome) {
            Some(FieldValue::Outcome(outcome)) => outcome.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("replica", &self.replica)
            .field("clock", &self.clock)
            .field("fields", &self.fields.len())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
