//! Internship postings.
//!
//! A posting belongs to exactly one company. It records both the owner's
//! user id and the company's display name at posting time; which of the
//! two decides ownership is chosen by [`OwnershipLink`].

use serde::{Deserialize, Serialize};

use crate::domain::user::User;
use crate::record::Record;

/// How a company user is matched to its postings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OwnershipLink {
    /// Match on the owner's user id. Survives company renames.
    #[default]
    ById,
    /// Match on the company display name, as older data did. Postings stay
    /// with whoever currently carries that name, so a rename detaches them.
    ByDisplayName,
}

/// Fields supplied by the company when posting or editing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternshipDetails {
    pub title: String,
    pub location: String,
    /// Employment type, e.g. "Full-time" or "Remote".
    #[serde(rename = "type")]
    pub kind: String,
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stipend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
}

/// A stored posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Internship {
    pub id: u64,
    /// Company display name at posting time.
    pub company: String,
    /// Owner's user id. Empty for postings written before ids were recorded.
    #[serde(default)]
    pub company_id: String,
    /// Human-readable posting date, e.g. "March 4".
    pub posted: String,
    #[serde(flatten)]
    pub details: InternshipDetails,
}

impl Internship {
    /// Whether `user` is the company that owns this posting.
    pub fn is_owned_by(&self, user: &User, link: OwnershipLink) -> bool {
        if !user.is_company() {
            return false;
        }
        match link {
            OwnershipLink::ById => self.company_id == user.id,
            OwnershipLink::ByDisplayName => {
                user.company_name.as_deref() == Some(self.company.as_str())
            }
        }
    }
}

/// A posting before an identifier is assigned.
#[derive(Debug, Clone)]
pub struct InternshipDraft {
    pub company: String,
    pub company_id: String,
    pub posted: String,
    pub details: InternshipDetails,
}

/// Posting fields to change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InternshipPatch {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub skills: Option<Vec<String>>,
    pub start_date: Option<String>,
    pub deadline: Option<String>,
    pub duration: Option<String>,
    pub stipend: Option<String>,
    pub company_website: Option<String>,
    pub company_logo: Option<String>,
}

impl From<InternshipDetails> for InternshipPatch {
    /// A patch that overwrites every editable field, as the edit form does.
    fn from(d: InternshipDetails) -> Self {
        Self {
            title: Some(d.title),
            company: None,
            location: Some(d.location),
            kind: Some(d.kind),
            category: Some(d.category),
            description: Some(d.description),
            skills: Some(d.skills),
            start_date: d.start_date,
            deadline: d.deadline,
            duration: d.duration,
            stipend: d.stipend,
            company_website: d.company_website,
            company_logo: d.company_logo,
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(v) = value {
        *slot = Some(v);
    }
}

impl Record for Internship {
    const COLLECTION: &'static str = "internships";
    const CHANNEL: &'static str = "internshipsChanged";
    type Id = u64;
    type Draft = InternshipDraft;
    type Patch = InternshipPatch;

    fn id(&self) -> &u64 {
        &self.id
    }

    fn from_draft(id: u64, draft: InternshipDraft) -> Self {
        Self {
            id,
            company: draft.company,
            company_id: draft.company_id,
            posted: draft.posted,
            details: draft.details,
        }
    }

    fn merge(&mut self, patch: InternshipPatch) {
        let d = &mut self.details;
        set(&mut d.title, patch.title);
        set(&mut self.company, patch.company);
        set(&mut d.location, patch.location);
        set(&mut d.kind, patch.kind);
        set(&mut d.category, patch.category);
        set(&mut d.description, patch.description);
        set(&mut d.skills, patch.skills);
        set_opt(&mut d.start_date, patch.start_date);
        set_opt(&mut d.deadline, patch.deadline);
        set_opt(&mut d.duration, patch.duration);
        set_opt(&mut d.stipend, patch.stipend);
        set_opt(&mut d.company_website, patch.company_website);
        set_opt(&mut d.company_logo, patch.company_logo);
    }
}
