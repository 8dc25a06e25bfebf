//! User accounts -- students and companies.
//!
//! A user's role and email are fixed at registration. Everything else is
//! profile data, edited through [`UserPatch`]. Profile sections (education,
//! experience, skills, documents) are owned by the user record and are
//! always replaced as a whole list.

use serde::{Deserialize, Serialize};

use crate::record::Record;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Account kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Company,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Company => "company",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A student or company account.
///
/// The password is kept and compared verbatim; this store is not an
/// authentication component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: Role,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile_completed: bool,

    // Student profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    // Company profile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,

    // Shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,

    // Owned profile sections.
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub skills_list: Vec<Skill>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl User {
    /// Name shown to other users: the company name for companies, the full
    /// name for students, falling back to the email.
    pub fn display_name(&self) -> String {
        let name = match self.role {
            Role::Company => self.company_name.clone(),
            Role::Student => {
                let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|p| !p.is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join(" "))
            }
        };
        name.unwrap_or_else(|| self.email.clone())
    }

    pub fn is_student(&self) -> bool {
        self.role == Role::Student
    }

    pub fn is_company(&self) -> bool {
        self.role == Role::Company
    }
}

// ---------------------------------------------------------------------------
// Profile sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    pub id: String,
    pub school: String,
    pub degree: String,
    pub field: String,
    pub start_year: String,
    pub end_year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub id: String,
    pub title: String,
    pub company: String,
    pub start_date: String,
    pub end_date: String,
    /// One bullet point per element.
    #[serde(default)]
    pub description: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
}

/// An uploaded file, kept as an opaque encoded URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub date_uploaded: String,
    pub url: String,
}

/// An entry in one of a user's profile sections.
///
/// Lets the session add, replace and remove entries of any section
/// uniformly. Entry ids are only meaningful inside their parent user.
pub trait ProfileEntry: Clone + Send + Sync + 'static {
    /// Section name used in log fields.
    const SECTION: &'static str;

    fn entry_id(&self) -> &str;

    fn assign_id(&mut self, id: String);

    /// The section's current entries in `user`.
    fn section(user: &User) -> &[Self];

    /// A patch replacing the whole section.
    fn replace_section(entries: Vec<Self>) -> UserPatch;
}

impl ProfileEntry for Education {
    const SECTION: &'static str = "education";

    fn entry_id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn section(user: &User) -> &[Self] {
        &user.education
    }

    fn replace_section(entries: Vec<Self>) -> UserPatch {
        UserPatch {
            education: Some(entries),
            ..UserPatch::default()
        }
    }
}

impl ProfileEntry for Experience {
    const SECTION: &'static str = "experiences";

    fn entry_id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn section(user: &User) -> &[Self] {
        &user.experiences
    }

    fn replace_section(entries: Vec<Self>) -> UserPatch {
        UserPatch {
            experiences: Some(entries),
            ..UserPatch::default()
        }
    }
}

impl ProfileEntry for Skill {
    const SECTION: &'static str = "skillsList";

    fn entry_id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn section(user: &User) -> &[Self] {
        &user.skills_list
    }

    fn replace_section(entries: Vec<Self>) -> UserPatch {
        UserPatch {
            skills_list: Some(entries),
            ..UserPatch::default()
        }
    }
}

impl ProfileEntry for Document {
    const SECTION: &'static str = "documents";

    fn entry_id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn section(user: &User) -> &[Self] {
        &user.documents
    }

    fn replace_section(entries: Vec<Self>) -> UserPatch {
        UserPatch {
            documents: Some(entries),
            ..UserPatch::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Drafts and patches
// ---------------------------------------------------------------------------

/// Profile fields to change. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub profile_completed: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub university: Option<String>,
    pub major: Option<String>,
    pub graduation_year: Option<String>,
    pub bio: Option<String>,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub company_size: Option<String>,
    pub founded_year: Option<String>,
    pub long_description: Option<String>,
    pub location: Option<String>,
    pub linked_in: Option<String>,
    pub twitter: Option<String>,
    pub education: Option<Vec<Education>>,
    pub experiences: Option<Vec<Experience>>,
    pub skills_list: Option<Vec<Skill>>,
    pub documents: Option<Vec<Document>>,
}

/// A user before an identifier is assigned.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub role: Role,
    pub email: String,
    pub password: String,
    pub details: UserPatch,
}

/// Fields collected by the student sign-up form.
#[derive(Debug, Clone, Default)]
pub struct StudentSignup {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub university: String,
}

impl From<StudentSignup> for UserDraft {
    fn from(s: StudentSignup) -> Self {
        Self {
            role: Role::Student,
            email: s.email,
            password: s.password,
            details: UserPatch {
                profile_completed: Some(false),
                first_name: Some(s.first_name),
                last_name: Some(s.last_name),
                university: Some(s.university),
                ..UserPatch::default()
            },
        }
    }
}

/// Fields collected by the company sign-up form.
#[derive(Debug, Clone, Default)]
pub struct CompanySignup {
    pub company_name: String,
    pub industry: String,
    pub website: String,
    pub email: String,
    pub password: String,
}

impl From<CompanySignup> for UserDraft {
    fn from(s: CompanySignup) -> Self {
        Self {
            role: Role::Company,
            email: s.email,
            password: s.password,
            details: UserPatch {
                profile_completed: Some(false),
                company_name: Some(s.company_name),
                industry: Some(s.industry),
                website: Some(s.website),
                ..UserPatch::default()
            },
        }
    }
}

fn replace<T>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(v) = value {
        *slot = Some(v);
    }
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const CHANNEL: &'static str = "usersChanged";
    type Id = String;
    type Draft = UserDraft;
    type Patch = UserPatch;

    fn id(&self) -> &String {
        &self.id
    }

    fn from_draft(id: String, draft: UserDraft) -> Self {
        let mut user = Self {
            id,
            role: draft.role,
            email: draft.email,
            password: draft.password,
            profile_completed: false,
            first_name: None,
            last_name: None,
            university: None,
            major: None,
            graduation_year: None,
            bio: None,
            company_name: None,
            industry: None,
            website: None,
            company_size: None,
            founded_year: None,
            long_description: None,
            location: None,
            linked_in: None,
            twitter: None,
            education: Vec::new(),
            experiences: Vec::new(),
            skills_list: Vec::new(),
            documents: Vec::new(),
        };
        user.merge(draft.details);
        user
    }

    fn merge(&mut self, patch: UserPatch) {
        if let Some(done) = patch.profile_completed {
            self.profile_completed = done;
        }
        replace(&mut self.first_name, patch.first_name);
        replace(&mut self.last_name, patch.last_name);
        replace(&mut self.university, patch.university);
        replace(&mut self.major, patch.major);
        replace(&mut self.graduation_year, patch.graduation_year);
        replace(&mut self.bio, patch.bio);
        replace(&mut self.company_name, patch.company_name);
        replace(&mut self.industry, patch.industry);
        replace(&mut self.website, patch.website);
        replace(&mut self.company_size, patch.company_size);
        replace(&mut self.founded_year, patch.founded_year);
        replace(&mut self.long_description, patch.long_description);
        replace(&mut self.location, patch.location);
        replace(&mut self.linked_in, patch.linked_in);
        replace(&mut self.twitter, patch.twitter);
        if let Some(entries) = patch.education {
            self.education = entries;
        }
        if let Some(entries) = patch.experiences {
            self.experiences = entries;
        }
        if let Some(entries) = patch.skills_list {
            self.skills_list = entries;
        }
        if let Some(entries) = patch.documents {
            self.documents = entries;
        }
    }
}
