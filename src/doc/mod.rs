//! Shared replicated document.
//!
//! - `field`: typed keys, values and stamps
//! - `document`: the replica with merge rules and change notifications

pub mod field;
pub mod document;

pub use field::{DocUpdate, FieldKey, FieldValue, Intent, Stamp};
pub use document::{DocChange, Document, Origin};
