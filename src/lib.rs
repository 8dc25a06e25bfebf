//! Local data store for an internship job board.
//!
//! Users, internships and applications are kept as whole JSON collections
//! under one base directory, together with the signed-in user. Every write
//! replaces its entry atomically and is announced on a [`ChangeBus`]; a
//! background watcher announces writes made by other processes sharing the
//! directory.

mod board;
mod bus;
mod collection;
pub mod domain;
mod error;
mod ids;
mod record;
mod session;
mod storage;
mod watch;

pub use board::{JobBoard, JobBoardBuilder};
pub use bus::{ChangeBus, ChangeNotice, Origin, SubscriptionToken};
pub use collection::Collection;
pub use domain::{
    Application, ApplicationForm, ApplicationPatch, ApplicationStats, ApplicationStatus,
    CompanySignup, Document, Education, Experience, Internship, InternshipDetails,
    InternshipPatch, OwnershipLink, ProfileEntry, Role, Skill, StudentSignup, User, UserPatch,
};
pub use error::StoreError;
pub use ids::{DEFAULT_MAX_ATTEMPTS, IdPolicy, OpaqueId, SHORT_ID_RANGE, Sequential, ShortRandomId};
pub use record::Record;
pub use session::{SESSION_CHANNEL, SESSION_ENTRY, SessionStore};
pub use storage::StorageLayout;
pub use watch::{WatchConfig, WatchHandle};
