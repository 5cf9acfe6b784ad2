//! Notes Facade (§4.9, secondary): user-facing text records, each backed by
//! a KB context of the same id.
//!
//! A note's context is minted lazily — [`crate::cognition::Cognition`]
//! creates the underlying [`crate::kb::Kb`] the first time something is
//! asserted with that `sourceNoteId`, not when the note record itself is
//! created. Deleting a note retracts everything sourced from it (`BY_NOTE`,
//! §4.4) before dropping the record; the context's `Kb` entry is left empty
//! rather than removed, mirroring how contexts are never explicitly torn
//! down elsewhere in the engine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a [`Note`]. Archived notes keep their context and
/// assertions active — archiving is a visibility hint for a client, not a
/// retraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteStatus {
    Active,
    Archived,
}

/// A user-facing note record (§3, "secondary... user-facing notes with
/// text/status"). Text-editing semantics beyond whole-value replacement are
/// out of scope; this is the record and its lifecycle only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub text: String,
    pub status: NoteStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Note {
    pub fn new(id: impl Into<String>, title: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: String::new(),
            status: NoteStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_note_is_active_and_empty() {
        let note = Note::new("note-1", "Shopping list", 1000);
        assert_eq!(note.status, NoteStatus::Active);
        assert!(note.text.is_empty());
        assert_eq!(note.created_at, note.updated_at);
    }
}
