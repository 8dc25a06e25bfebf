//! Entities kept by the job board.

pub mod application;
pub mod internship;
pub mod user;

pub use application::{
    Application, ApplicationDraft, ApplicationForm, ApplicationPatch, ApplicationStats,
    ApplicationStatus,
};
pub use internship::{Internship, InternshipDetails, InternshipDraft, InternshipPatch, OwnershipLink};
pub use user::{
    CompanySignup, Document, Education, Experience, ProfileEntry, Role, Skill, StudentSignup,
    User, UserDraft, UserPatch,
};
