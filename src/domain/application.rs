//! Applications -- a student's request to join one internship.
//!
//! An application moves forward through review stages:
//! Pending -> Reviewing -> Shortlisted -> Accepted | Rejected.
//! Rejection is possible from any open stage. Accepted and Rejected are
//! final decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Review stage of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Reviewing,
    Shortlisted,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Reviewing,
        Self::Shortlisted,
        Self::Accepted,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewing => "reviewing",
            Self::Shortlisted => "shortlisted",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    /// Whether a decision has been made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected)
    }

    /// Whether moving to `next` follows the intended review path.
    ///
    /// Advisory only: companies may skip stages. Terminal states are the
    /// one hard rule, enforced by the board.
    pub fn is_forward_step(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Reviewing)
            | (Self::Reviewing, Self::Shortlisted)
            | (Self::Shortlisted, Self::Accepted) => true,
            (from, Self::Rejected) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Five-digit number applicants can quote.
    pub id: u64,
    pub internship_id: u64,
    pub student_id: String,
    pub cover_letter: String,
    /// Encoded resume file (data URL), stored as given.
    pub resume: String,
    pub resume_file_name: String,
    pub status: ApplicationStatus,
    pub applied_date: DateTime<Utc>,
    /// Company feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// An application before an identifier is assigned.
#[derive(Debug, Clone, Default)]
pub struct ApplicationDraft {
    pub internship_id: u64,
    pub student_id: String,
    pub cover_letter: String,
    pub resume: String,
    pub resume_file_name: String,
}

/// What a signed-in student submits; the student id comes from the session.
#[derive(Debug, Clone, Default)]
pub struct ApplicationForm {
    pub internship_id: u64,
    pub cover_letter: String,
    pub resume: String,
    pub resume_file_name: String,
}

impl ApplicationForm {
    pub fn for_student(self, student_id: impl Into<String>) -> ApplicationDraft {
        ApplicationDraft {
            internship_id: self.internship_id,
            student_id: student_id.into(),
            cover_letter: self.cover_letter,
            resume: self.resume,
            resume_file_name: self.resume_file_name,
        }
    }
}

/// Application fields to change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationPatch {
    pub status: Option<ApplicationStatus>,
    pub notes: Option<String>,
}

impl Record for Application {
    const COLLECTION: &'static str = "applications";
    const CHANNEL: &'static str = "applicationsChanged";
    type Id = u64;
    type Draft = ApplicationDraft;
    type Patch = ApplicationPatch;

    fn id(&self) -> &u64 {
        &self.id
    }

    fn from_draft(id: u64, draft: ApplicationDraft) -> Self {
        Self {
            id,
            internship_id: draft.internship_id,
            student_id: draft.student_id,
            cover_letter: draft.cover_letter,
            resume: draft.resume,
            resume_file_name: draft.resume_file_name,
            status: ApplicationStatus::Pending,
            applied_date: Utc::now(),
            notes: None,
        }
    }

    fn merge(&mut self, patch: ApplicationPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(notes) = patch.notes {
            self.notes = Some(notes);
        }
    }
}

/// Per-status counts shown on a company dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplicationStats {
    pub total: usize,
    pub pending: usize,
    pub reviewing: usize,
    pub shortlisted: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl ApplicationStats {
    pub fn tally<'a>(applications: impl IntoIterator<Item = &'a Application>) -> Self {
        applications
            .into_iter()
            .fold(Self::default(), |mut stats, app| {
                stats.total += 1;
                match app.status {
                    ApplicationStatus::Pending => stats.pending += 1,
                    ApplicationStatus::Reviewing => stats.reviewing += 1,
                    ApplicationStatus::Shortlisted => stats.shortlisted += 1,
                    ApplicationStatus::Accepted => stats.accepted += 1,
                    ApplicationStatus::Rejected => stats.rejected += 1,
                }
                stats
            })
    }
}
