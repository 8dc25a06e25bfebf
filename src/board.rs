//! The job board: one explicit store object owning every collection.
//!
//! [`JobBoardBuilder`] opens the three collections and the session on a
//! shared base directory and wires them to one [`ChangeBus`]. Consumers hold
//! a [`JobBoard`] (or a clone) instead of reaching for global state.
//!
//! Workflows that span collections (registration, posting, applying,
//! reviewing) live here. They check roles and ownership against the signed-in
//! user before touching the store, and read storage afresh so that writes
//! made by other processes are seen even before the watcher reports them.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::bus::ChangeBus;
use crate::collection::Collection;
use crate::domain::{
    Application, ApplicationForm, ApplicationPatch, ApplicationStats, ApplicationStatus,
    CompanySignup, Internship, InternshipDetails, InternshipDraft, InternshipPatch,
    OwnershipLink, StudentSignup, User, UserDraft, UserPatch,
};
use crate::error::StoreError;
use crate::ids::{OpaqueId, Sequential, ShortRandomId};
use crate::record::Record;
use crate::session::SessionStore;
use crate::storage::StorageLayout;
use crate::watch::{WatchConfig, WatchHandle, WatchTarget, spawn_watcher};

/// Handle to an opened job board.
///
/// `Clone` is cheap: every store is `Arc`-backed and clones share state,
/// subscribers and the watcher.
#[derive(Clone)]
pub struct JobBoard {
    layout: StorageLayout,
    bus: ChangeBus,
    users: Collection<User>,
    internships: Collection<Internship>,
    applications: Collection<Application>,
    session: SessionStore,
    ownership: OwnershipLink,
    watch_config: WatchConfig,
    watch_handle: Arc<tokio::sync::Mutex<Option<WatchHandle>>>,
}

impl std::fmt::Debug for JobBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobBoard")
            .field("base_dir", &self.layout.base_dir())
            .field("ownership", &self.ownership)
            .finish_non_exhaustive()
    }
}

impl JobBoard {
    /// Open a board on `base_dir` with default settings.
    ///
    /// # Errors
    ///
    /// See [`JobBoardBuilder::open`].
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        JobBoardBuilder::new().base_dir(base_dir).open()
    }

    /// Start watching storage for writes made by other processes.
    ///
    /// Boards opened inside a tokio runtime already watch (see
    /// [`JobBoardBuilder::watch`]); this restarts the watcher after
    /// [`close`](JobBoard::close) or starts it for a board opened outside a
    /// runtime. Changes found by the watcher are reloaded and published with
    /// [`Origin::External`](crate::Origin::External).
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::AlreadyExists`] if the watcher is running, or
    /// the platform error if the directory cannot be watched.
    pub async fn start_watching(&self) -> io::Result<WatchHandle> {
        let mut guard = self.watch_handle.lock().await;
        if guard.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "storage watcher already started",
            ));
        }

        let handle = spawn_watcher(
            &tokio::runtime::Handle::current(),
            &self.layout,
            self.watch_targets(),
            self.watch_config.clone(),
        )?;
        *guard = Some(handle.clone());
        Ok(handle)
    }

    fn watch_targets(&self) -> Vec<Arc<dyn WatchTarget>> {
        vec![
            Arc::new(self.users.clone()),
            Arc::new(self.session.clone()),
            Arc::new(self.internships.clone()),
            Arc::new(self.applications.clone()),
        ]
    }

    /// Stop the watcher, if running.
    ///
    /// Stores stay usable after closing; only cross-process notifications
    /// stop. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if the watcher task panicked.
    pub async fn close(&self) -> io::Result<()> {
        let handle = self.watch_handle.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await?;
        }
        tracing::info!(base_dir = %self.layout.base_dir().display(), "job board closed");
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        self.layout.base_dir()
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn users(&self) -> &Collection<User> {
        &self.users
    }

    pub fn internships(&self) -> &Collection<Internship> {
        &self.internships
    }

    pub fn applications(&self) -> &Collection<Application> {
        &self.applications
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn ownership(&self) -> OwnershipLink {
        self.ownership
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Create a student account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEmail`] if the email is taken.
    pub fn register_student(&self, signup: StudentSignup) -> Result<User, StoreError> {
        self.register(signup.into())
    }

    /// Create a company account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEmail`] if the email is taken.
    pub fn register_company(&self, signup: CompanySignup) -> Result<User, StoreError> {
        self.register(signup.into())
    }

    fn register(&self, draft: UserDraft) -> Result<User, StoreError> {
        let user = self.users.try_insert(draft, |users, draft| {
            if users.iter().any(|u| u.email == draft.email) {
                tracing::warn!(role = %draft.role, "registration rejected: email in use");
                return Err(StoreError::DuplicateEmail(draft.email.clone()));
            }
            Ok(())
        })?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        self.session.sign_in_as(user.clone())?;
        Ok(user)
    }

    pub fn get_user_by_id(&self, id: &str) -> Option<User> {
        fresh(&self.users).find_by_id(&id.to_owned())
    }

    /// Merge `patch` into the signed-in user and mark the profile complete.
    pub fn complete_profile(&self, patch: UserPatch) -> Result<User, StoreError> {
        self.session.complete_profile(patch)
    }

    // -----------------------------------------------------------------------
    // Internships
    // -----------------------------------------------------------------------

    /// Publish a posting owned by the signed-in company.
    ///
    /// The company name and id are taken from the session; the posted date
    /// is today's, e.g. "March 4".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session and
    /// [`StoreError::Forbidden`] for student users.
    pub fn post_internship(&self, details: InternshipDetails) -> Result<Internship, StoreError> {
        let company = self.require_company()?;
        let internship = self.internships.insert(InternshipDraft {
            company: company.display_name(),
            company_id: company.id.clone(),
            posted: Utc::now().format("%B %-d").to_string(),
            details,
        })?;
        tracing::info!(
            internship_id = internship.id,
            company_id = %company.id,
            "internship posted"
        );
        Ok(internship)
    }

    /// Apply `patch` to a posting owned by the signed-in company.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Forbidden`] when the caller does not own the posting.
    pub fn edit_internship(
        &self,
        id: u64,
        patch: impl Into<InternshipPatch>,
    ) -> Result<Internship, StoreError> {
        let patch = patch.into();
        let company = self.require_company()?;
        let ownership = self.ownership;
        self.internships.try_update(&id, |current| {
            if !current.is_owned_by(&company, ownership) {
                return Err(forbidden_internship(&company, id));
            }
            Ok(patch)
        })
    }

    /// Delete a posting owned by the signed-in company.
    ///
    /// Applications for the posting are kept.
    ///
    /// # Returns
    ///
    /// The result of [`Collection::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Forbidden`] when the caller does not own the posting.
    pub fn delete_internship(&self, id: u64) -> Result<bool, StoreError> {
        let company = self.require_company()?;
        let internship = fresh(&self.internships)
            .find_by_id(&id)
            .ok_or_else(|| StoreError::not_found("internships", id))?;
        if !internship.is_owned_by(&company, self.ownership) {
            return Err(forbidden_internship(&company, id));
        }
        Ok(self.internships.remove(&id))
    }

    /// Postings owned by `company`.
    pub fn internships_for_company(&self, company: &User) -> Vec<Internship> {
        let ownership = self.ownership;
        fresh(&self.internships).find_all_where(|i| i.is_owned_by(company, ownership))
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    /// Submit an application as the signed-in student.
    ///
    /// # Errors
    ///
    /// * [`StoreError::Forbidden`] for company users.
    /// * [`StoreError::NotFound`] if the internship does not exist.
    /// * [`StoreError::AlreadyApplied`] if this student already applied to it.
    pub fn submit_application(&self, form: ApplicationForm) -> Result<Application, StoreError> {
        self.session.refresh()?;
        let student = self.session.require()?;
        if !student.is_student() {
            return Err(StoreError::Forbidden(format!(
                "user {} is not a student",
                student.id
            )));
        }
        if fresh(&self.internships).find_by_id(&form.internship_id).is_none() {
            return Err(StoreError::not_found("internships", form.internship_id));
        }

        let application = self
            .applications
            .try_insert(form.for_student(student.id), |applications, draft| {
                let duplicate = applications.iter().any(|a| {
                    a.student_id == draft.student_id && a.internship_id == draft.internship_id
                });
                if duplicate {
                    tracing::warn!(
                        student_id = %draft.student_id,
                        internship_id = draft.internship_id,
                        "duplicate application rejected"
                    );
                    return Err(StoreError::AlreadyApplied {
                        student_id: draft.student_id.clone(),
                        internship_id: draft.internship_id,
                    });
                }
                Ok(())
            })?;
        tracing::info!(
            application_id = application.id,
            internship_id = application.internship_id,
            "application submitted"
        );
        Ok(application)
    }

    pub fn has_applied(&self, student_id: &str, internship_id: u64) -> bool {
        fresh(&self.applications)
            .any(|a| a.student_id == student_id && a.internship_id == internship_id)
    }

    pub fn applications_for_student(&self, student_id: &str) -> Vec<Application> {
        fresh(&self.applications)
            .find_all_where(|a| a.student_id == student_id)
    }

    pub fn applications_for_internship(&self, internship_id: u64) -> Vec<Application> {
        fresh(&self.applications)
            .find_all_where(|a| a.internship_id == internship_id)
    }

    /// Applications to any posting owned by `company`.
    pub fn applications_for_company(&self, company: &User) -> Vec<Application> {
        let owned: Vec<u64> = self
            .internships_for_company(company)
            .into_iter()
            .map(|i| i.id)
            .collect();
        fresh(&self.applications)
            .find_all_where(|a| owned.contains(&a.internship_id))
    }

    /// Per-status counts over [`applications_for_company`](Self::applications_for_company).
    pub fn application_stats(&self, company: &User) -> ApplicationStats {
        ApplicationStats::tally(&self.applications_for_company(company))
    }

    /// Move an application to `status`, optionally replacing the company's
    /// notes. Empty notes leave the existing ones in place.
    ///
    /// Only the company owning the internship may do this. Accepted and
    /// rejected applications are final; setting the same final status again
    /// is allowed so notes can still be edited.
    ///
    /// # Errors
    ///
    /// * [`StoreError::NotFound`] for an unknown application.
    /// * [`StoreError::Forbidden`] when the caller does not own the internship.
    /// * [`StoreError::TerminalStatus`] when leaving a final status.
    pub fn update_application_status(
        &self,
        id: u64,
        status: ApplicationStatus,
        notes: Option<String>,
    ) -> Result<Application, StoreError> {
        let company = self.require_company()?;
        let ownership = self.ownership;
        let internships = fresh(&self.internships);
        let notes = notes.filter(|n| !n.is_empty());

        let updated = self.applications.try_update(&id, |current| {
            let owned = internships
                .find_by_id(&current.internship_id)
                .is_some_and(|i| i.is_owned_by(&company, ownership));
            if !owned {
                return Err(StoreError::Forbidden(format!(
                    "user {} cannot review application {id}",
                    company.id
                )));
            }
            if current.status.is_terminal() && current.status != status {
                return Err(StoreError::TerminalStatus {
                    id,
                    status: current.status,
                });
            }
            if !current.status.is_forward_step(status) && current.status != status {
                tracing::debug!(
                    application_id = id,
                    from = %current.status,
                    to = %status,
                    "status change skips the usual review path"
                );
            }
            Ok(ApplicationPatch {
                status: Some(status),
                notes,
            })
        })?;

        tracing::info!(application_id = id, %status, "application status updated");
        Ok(updated)
    }

    /// Delete an application as the owning company or the applicant.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Forbidden`] for anyone else.
    pub fn delete_application(&self, id: u64) -> Result<bool, StoreError> {
        self.session.refresh()?;
        let user = self.session.require()?;
        let application = fresh(&self.applications)
            .find_by_id(&id)
            .ok_or_else(|| StoreError::not_found("applications", id))?;

        let allowed = if user.is_student() {
            application.student_id == user.id
        } else {
            fresh(&self.internships)
                .find_by_id(&application.internship_id)
                .is_some_and(|i| i.is_owned_by(&user, self.ownership))
        };
        if !allowed {
            return Err(StoreError::Forbidden(format!(
                "user {} cannot delete application {id}",
                user.id
            )));
        }
        Ok(self.applications.remove(&id))
    }

    fn require_company(&self) -> Result<User, StoreError> {
        self.session.refresh()?;
        let user = self.session.require()?;
        if !user.is_company() {
            return Err(StoreError::Forbidden(format!(
                "user {} is not a company",
                user.id
            )));
        }
        Ok(user)
    }
}

/// Bring `collection` up to date with storage before a read. A failed
/// reload keeps the last good snapshot.
fn fresh<R: Record>(collection: &Collection<R>) -> &Collection<R> {
    if let Err(e) = collection.refresh() {
        tracing::error!(
            collection = R::COLLECTION,
            error = %e,
            "failed to reload entry, keeping last good state"
        );
    }
    collection
}

fn forbidden_internship(company: &User, id: u64) -> StoreError {
    tracing::warn!(user_id = %company.id, internship_id = id, "not the posting's owner");
    StoreError::Forbidden(format!("user {} does not own internship {id}", company.id))
}

/// Builder for configuring and opening a [`JobBoard`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use internboard::{JobBoardBuilder, WatchConfig};
///
/// # fn example() -> Result<(), internboard::StoreError> {
/// let board = JobBoardBuilder::new()
///     .base_dir("/tmp/internboard")
///     .watch_config(WatchConfig {
///         debounce: Duration::from_millis(20),
///     })
///     .open()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JobBoardBuilder {
    base_dir: Option<PathBuf>,
    watch: bool,
    watch_config: WatchConfig,
    application_ids: Option<ShortRandomId>,
    ownership: OwnershipLink,
}

impl JobBoardBuilder {
    pub fn new() -> Self {
        Self {
            base_dir: None,
            watch: true,
            watch_config: WatchConfig::default(),
            application_ids: None,
            ownership: OwnershipLink::default(),
        }
    }

    /// Set the directory holding the board's entries.
    ///
    /// If not set, defaults to `internboard` under the system temp directory.
    pub fn base_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.base_dir = Some(path.as_ref().to_owned());
        self
    }

    /// Whether [`open`](JobBoardBuilder::open) starts the storage watcher.
    ///
    /// The watcher needs a tokio runtime; a board opened outside one only
    /// sees foreign writes through the fresh reads its workflows make, until
    /// [`JobBoard::start_watching`] is called.
    ///
    /// Default: `true`.
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = enabled;
        self
    }

    pub fn watch_config(mut self, config: WatchConfig) -> Self {
        self.watch_config = config;
        self
    }

    /// Identifier policy for applications. Defaults to
    /// [`ShortRandomId::default`].
    pub fn application_ids(mut self, ids: ShortRandomId) -> Self {
        self.application_ids = Some(ids);
        self
    }

    pub fn ownership(mut self, link: OwnershipLink) -> Self {
        self.ownership = link;
        self
    }

    /// Load every entry and build the [`JobBoard`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if any stored entry cannot be
    /// decoded, or [`StoreError::Io`] if the directory cannot be read or
    /// watched.
    pub fn open(self) -> Result<JobBoard, StoreError> {
        let base_dir = self
            .base_dir
            .unwrap_or_else(|| std::env::temp_dir().join("internboard"));
        let layout = StorageLayout::new(base_dir);
        let bus = ChangeBus::new();

        let users = Collection::open(layout.clone(), bus.clone(), OpaqueId)?;
        let internships = Collection::open(layout.clone(), bus.clone(), Sequential)?;
        let applications = Collection::open(
            layout.clone(),
            bus.clone(),
            self.application_ids.unwrap_or_default(),
        )?;
        let session = SessionStore::open(layout.clone(), bus.clone(), users.clone())?;

        tracing::info!(
            base_dir = %layout.base_dir().display(),
            users = users.len(),
            internships = internships.len(),
            applications = applications.len(),
            "job board opened"
        );

        let mut board = JobBoard {
            layout,
            bus,
            users,
            internships,
            applications,
            session,
            ownership: self.ownership,
            watch_config: self.watch_config,
            watch_handle: Arc::new(tokio::sync::Mutex::new(None)),
        };

        if self.watch {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let handle = spawn_watcher(
                        &runtime,
                        &board.layout,
                        board.watch_targets(),
                        board.watch_config.clone(),
                    )?;
                    board.watch_handle = Arc::new(tokio::sync::Mutex::new(Some(handle)));
                }
                Err(_) => {
                    tracing::debug!("no tokio runtime, storage watcher not started");
                }
            }
        }

        Ok(board)
    }
}

impl Default for JobBoardBuilder {
    fn default() -> Self {
        Self::new()
    }
}
