//! Crate-level error type shared by every store.

use crate::domain::ApplicationStatus;

/// Error returned by collection, session and board operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Disk I/O failure.
    ///
    /// Reading, writing or renaming an entry file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted entry could not be decoded.
    ///
    /// Corrupt data is a hard failure for the affected collection; no
    /// partial recovery is attempted.
    #[error("entry '{entry}' is malformed: {source}")]
    Malformed {
        entry: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A collection could not be encoded for writing.
    #[error("failed to encode entry '{entry}': {source}")]
    Encode {
        entry: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The referenced record does not exist.
    #[error("no record with id {id} in '{collection}'")]
    NotFound { collection: &'static str, id: String },

    /// Registration rejected because the email is already taken.
    #[error("email '{0}' is already registered")]
    DuplicateEmail(String),

    /// The student already has an application for this internship.
    #[error("student {student_id} already applied to internship {internship_id}")]
    AlreadyApplied {
        student_id: String,
        internship_id: u64,
    },

    /// The operation needs a signed-in user.
    #[error("no user is signed in")]
    NotAuthenticated,

    /// The signed-in user may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Random identifier allocation gave up.
    #[error("no free identifier found after {attempts} attempts")]
    IdSpaceExhausted { attempts: u32 },

    /// The application already reached a final decision.
    #[error("application {id} is {status} and can no longer change status")]
    TerminalStatus { id: u64, status: ApplicationStatus },
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }
}
