//! Record trait implemented by every entity kept in a [`Collection`](crate::Collection).

use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Serialize, de::DeserializeOwned};

/// An entity stored as one element of a named, durable sequence.
///
/// # Associated Types
///
/// - `Id`: the identifier assigned at insertion, never changed afterwards.
/// - `Draft`: the record's fields minus the identifier, as supplied by the caller.
/// - `Patch`: a set of optional field replacements for [`update`](crate::Collection::update).
///
/// # Contract
///
/// - [`merge`](Record::merge) is a shallow merge: every field present in the
///   patch replaces the stored field wholesale, nested lists included. It
///   never touches the identifier.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Storage entry name (e.g. `"internships"`).
    const COLLECTION: &'static str;

    /// Bus channel published after every successful write (e.g. `"internshipsChanged"`).
    const CHANNEL: &'static str;

    /// Identifier type.
    type Id: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static;

    /// The record without its identifier.
    type Draft;

    /// Partial update applied by [`merge`](Record::merge).
    type Patch;

    /// The record's identifier.
    fn id(&self) -> &Self::Id;

    /// Build a record from a draft and a freshly allocated identifier.
    fn from_draft(id: Self::Id, draft: Self::Draft) -> Self;

    /// Shallow-merge a patch into this record.
    fn merge(&mut self, patch: Self::Patch);
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::Record;
    use serde::{Deserialize, Serialize};

    /// A minimal record used by collection and watcher tests.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Note {
        pub id: u64,
        pub text: String,
        pub tags: Vec<String>,
    }

    #[derive(Debug, Clone)]
    pub(crate) struct NoteDraft {
        pub text: String,
        pub tags: Vec<String>,
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct NotePatch {
        pub text: Option<String>,
        pub tags: Option<Vec<String>>,
    }

    impl NoteDraft {
        pub(crate) fn new(text: &str) -> Self {
            Self {
                text: text.to_owned(),
                tags: Vec::new(),
            }
        }
    }

    impl Record for Note {
        const COLLECTION: &'static str = "notes";
        const CHANNEL: &'static str = "notesChanged";
        type Id = u64;
        type Draft = NoteDraft;
        type Patch = NotePatch;

        fn id(&self) -> &u64 {
            &self.id
        }

        fn from_draft(id: u64, draft: NoteDraft) -> Self {
            Self {
                id,
                text: draft.text,
                tags: draft.tags,
            }
        }

        fn merge(&mut self, patch: NotePatch) {
            if let Some(text) = patch.text {
                self.text = text;
            }
            if let Some(tags) = patch.tags {
                self.tags = tags;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Record;
    use super::test_fixtures::{Note, NoteDraft, NotePatch};

    #[test]
    fn from_draft_assigns_id() {
        let note = Note::from_draft(3, NoteDraft::new("hello"));
        assert_eq!(*note.id(), 3);
        assert_eq!(note.text, "hello");
    }

    #[test]
    fn merge_replaces_nested_lists_wholesale() {
        let mut note = Note {
            id: 1,
            text: "a".into(),
            tags: vec!["x".into(), "y".into()],
        };
        note.merge(NotePatch {
            tags: Some(vec!["z".into()]),
            ..NotePatch::default()
        });
        assert_eq!(note.tags, vec!["z".to_string()]);
        assert_eq!(note.text, "a", "absent fields stay untouched");
    }
}
