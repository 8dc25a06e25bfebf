//! Session store: at most one signed-in user, derived from the users
//! collection.
//!
//! The session holds a *copy* of the user record, persisted under the
//! `currentUser` entry. Profile edits are computed from the stored user
//! record (reloaded if another process changed it), written to the users
//! collection first, and the session copy is then replaced by the stored
//! record, so both entries agree after every successful edit.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use crate::bus::{ChangeBus, Origin};
use crate::collection::Collection;
use crate::domain::{ProfileEntry, Role, User, UserPatch};
use crate::error::StoreError;
use crate::ids::new_entry_id;
use crate::storage::{EntryDigest, StorageLayout, digest};
use crate::watch::WatchTarget;

/// Storage entry holding the signed-in user.
pub const SESSION_ENTRY: &str = "currentUser";

/// Channel published whenever the session changes.
pub const SESSION_CHANNEL: &str = "userStateChange";

#[derive(Default)]
struct SessionState {
    current: Option<User>,
    digest: Option<EntryDigest>,
}

/// Holds the signed-in user.
///
/// `Clone` is cheap; clones share the same state.
#[derive(Clone)]
pub struct SessionStore {
    layout: StorageLayout,
    bus: ChangeBus,
    users: Collection<User>,
    state: Arc<RwLock<SessionState>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("user_id", &self.current().map(|u| u.id))
            .finish()
    }
}

impl SessionStore {
    /// Open the session and restore any signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the stored session cannot be decoded.
    pub fn open(
        layout: StorageLayout,
        bus: ChangeBus,
        users: Collection<User>,
    ) -> Result<Self, StoreError> {
        let session = Self {
            layout,
            bus,
            users,
            state: Arc::new(RwLock::new(SessionState::default())),
        };
        session.load()?;
        Ok(session)
    }

    /// Re-read the session entry from storage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] for undecodable data; the in-memory
    /// session is left untouched in that case.
    pub fn load(&self) -> Result<Option<User>, StoreError> {
        let mut state = self.write_state();
        let bytes = self.layout.read(SESSION_ENTRY)?;
        let entry_digest = digest(bytes.as_deref());
        state.current = decode(bytes)?;
        state.digest = entry_digest;
        Ok(state.current.clone())
    }

    /// Reload the session if another process signed in or out.
    ///
    /// A reload is published on [`SESSION_CHANNEL`] with [`Origin::External`].
    ///
    /// # Returns
    ///
    /// `true` if the session was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] for undecodable data; the in-memory
    /// session is kept in that case.
    pub fn refresh(&self) -> Result<bool, StoreError> {
        {
            let mut state = self.write_state();
            let bytes = self.layout.read(SESSION_ENTRY)?;
            let entry_digest = digest(bytes.as_deref());
            if entry_digest == state.digest {
                return Ok(false);
            }
            state.current = decode(bytes)?;
            state.digest = entry_digest;
        }
        tracing::debug!(entry = SESSION_ENTRY, "session reloaded after foreign write");
        self.bus.publish(SESSION_CHANNEL, Origin::External);
        Ok(true)
    }

    /// The signed-in user, if any.
    pub fn current(&self) -> Option<User> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .is_some()
    }

    /// The signed-in user, or [`StoreError::NotAuthenticated`].
    pub fn require(&self) -> Result<User, StoreError> {
        self.current().ok_or(StoreError::NotAuthenticated)
    }

    /// Sign in with an exact match on email, password and role.
    ///
    /// # Returns
    ///
    /// `Ok(false)` if no user matches; nothing is written in that case.
    ///
    /// # Errors
    ///
    /// Returns an I/O or encoding error if the session cannot be written.
    pub fn login(&self, email: &str, password: &str, role: Role) -> Result<bool, StoreError> {
        self.users.refresh()?;
        let found = self
            .users
            .find_all_where(|u| u.email == email && u.password == password && u.role == role)
            .into_iter()
            .next();

        match found {
            Some(user) => {
                tracing::info!(user_id = %user.id, %role, "signed in");
                self.set_current(Some(user))?;
                Ok(true)
            }
            None => {
                tracing::warn!(%role, "sign-in rejected");
                Ok(false)
            }
        }
    }

    /// Sign out. Signing out with no active session still publishes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the session entry cannot be removed.
    pub fn logout(&self) -> Result<(), StoreError> {
        if let Some(user) = self.current() {
            tracing::info!(user_id = %user.id, "signed out");
        }
        self.set_current(None)
    }

    /// Make `user` the signed-in user without checking credentials.
    pub(crate) fn sign_in_as(&self, user: User) -> Result<(), StoreError> {
        self.set_current(Some(user))
    }

    /// Merge `patch` into the signed-in user.
    ///
    /// Writes the users collection, then refreshes the session copy from the
    /// stored record.
    ///
    /// # Returns
    ///
    /// The updated user.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotAuthenticated`] without a session, or
    /// [`StoreError::NotFound`] if the user was deleted from the collection.
    pub fn update_profile(&self, patch: UserPatch) -> Result<User, StoreError> {
        self.edit_current(|_| Ok(patch))
    }

    /// Mark the profile complete after merging `patch`.
    pub fn complete_profile(&self, patch: UserPatch) -> Result<User, StoreError> {
        self.update_profile(UserPatch {
            profile_completed: Some(true),
            ..patch
        })
    }

    /// Append an entry to one of the signed-in user's profile sections.
    ///
    /// # Returns
    ///
    /// The entry as stored, with its newly assigned id.
    pub fn add_entry<E: ProfileEntry>(&self, mut entry: E) -> Result<E, StoreError> {
        entry.assign_id(new_entry_id());
        let added = entry.clone();
        self.edit_current(move |user| {
            let mut entries = E::section(user).to_vec();
            entries.push(entry);
            Ok(E::replace_section(entries))
        })?;
        tracing::debug!(section = E::SECTION, entry_id = added.entry_id(), "entry added");
        Ok(added)
    }

    /// Replace the entry with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the section has no entry with that id.
    pub fn replace_entry<E: ProfileEntry>(&self, entry: E) -> Result<E, StoreError> {
        let replacement = entry.clone();
        self.edit_current(move |user| {
            let mut entries = E::section(user).to_vec();
            let slot = entries
                .iter_mut()
                .find(|e| e.entry_id() == entry.entry_id())
                .ok_or_else(|| StoreError::not_found(E::SECTION, entry.entry_id()))?;
            *slot = entry;
            Ok(E::replace_section(entries))
        })?;
        Ok(replacement)
    }

    /// Delete an entry from one of the signed-in user's profile sections.
    ///
    /// # Returns
    ///
    /// `false` if there was no entry with that id; nothing is written then.
    pub fn remove_entry<E: ProfileEntry>(&self, entry_id: &str) -> Result<bool, StoreError> {
        let outcome = self.edit_current(|user| {
            let before = E::section(user);
            let entries: Vec<E> = before
                .iter()
                .filter(|e| e.entry_id() != entry_id)
                .cloned()
                .collect();
            if entries.len() == before.len() {
                return Err(StoreError::not_found(E::SECTION, entry_id));
            }
            Ok(E::replace_section(entries))
        });
        match outcome {
            Ok(_) => {
                tracing::debug!(section = E::SECTION, entry_id, "entry removed");
                Ok(true)
            }
            Err(StoreError::NotFound { collection, .. }) if collection == E::SECTION => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Apply a patch derived from the stored record of the signed-in user,
    /// then re-copy the session from the result.
    fn edit_current<F>(&self, decide: F) -> Result<User, StoreError>
    where
        F: FnOnce(&User) -> Result<UserPatch, StoreError>,
    {
        self.refresh()?;
        let current = self.require()?;
        let updated = self.users.try_update(&current.id, decide)?;
        self.set_current(Some(updated.clone()))?;
        Ok(updated)
    }

    fn set_current(&self, user: Option<User>) -> Result<(), StoreError> {
        {
            let mut state = self.write_state();
            state.digest = match &user {
                Some(u) => {
                    let bytes = serde_json::to_vec(u).map_err(|source| StoreError::Encode {
                        entry: SESSION_ENTRY,
                        source,
                    })?;
                    self.layout.write(SESSION_ENTRY, &bytes)?;
                    digest(Some(&bytes))
                }
                None => {
                    self.layout.remove(SESSION_ENTRY)?;
                    None
                }
            };
            state.current = user;
        }
        self.bus.publish(SESSION_CHANNEL, Origin::Local);
        Ok(())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WatchTarget for SessionStore {
    fn entry(&self) -> &'static str {
        SESSION_ENTRY
    }

    fn refresh(&self) -> Result<bool, StoreError> {
        SessionStore::refresh(self)
    }
}

fn decode(bytes: Option<Vec<u8>>) -> Result<Option<User>, StoreError> {
    bytes
        .map(|bytes| {
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
                entry: SESSION_ENTRY,
                source,
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompanySignup, Education, Skill, StudentSignup};
    use crate::ids::OpaqueId;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        users: Collection<User>,
        session: SessionStore,
        bus: ChangeBus,
    }

    fn fixture(dir: &Path) -> Fixture {
        let bus = ChangeBus::new();
        let layout = StorageLayout::new(dir);
        let users = Collection::open(layout.clone(), bus.clone(), OpaqueId).expect("users");
        let session = SessionStore::open(layout, bus.clone(), users.clone()).expect("session");
        Fixture {
            users,
            session,
            bus,
        }
    }

    fn add_student(users: &Collection<User>) -> User {
        users
            .insert(
                StudentSignup {
                    first_name: "Grace".into(),
                    last_name: "Hopper".into(),
                    email: "grace@navy.mil".into(),
                    password: "cobol1959".into(),
                    university: "Yale".into(),
                }
                .into(),
            )
            .expect("insert student")
    }

    #[test]
    fn login_requires_all_three_fields() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        add_student(&f.users);

        assert!(!f.session.login("grace@navy.mil", "wrong", Role::Student).expect("login"));
        assert!(!f.session.login("grace@navy.mil", "cobol1959", Role::Company).expect("login"));
        assert!(!f.session.is_authenticated());
        assert!(
            f.session.layout.read(SESSION_ENTRY).expect("read").is_none(),
            "failed login writes nothing"
        );

        assert!(f.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login"));
        assert!(f.session.is_authenticated());
    }

    #[test]
    fn login_and_logout_publish() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        add_student(&f.users);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        f.bus.subscribe(SESSION_CHANNEL, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        f.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");
        f.session.logout().expect("logout");

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(f.session.current().is_none());
        assert!(f.session.layout.read(SESSION_ENTRY).expect("read").is_none());
    }

    #[test]
    fn session_survives_reopen() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        let student = add_student(&f.users);
        f.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");

        let reopened = fixture(tmp.path());
        assert_eq!(reopened.session.current(), Some(student));
    }

    #[test]
    fn update_profile_keeps_session_and_users_in_step() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        let student = add_student(&f.users);
        f.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");

        let updated = f
            .session
            .complete_profile(UserPatch {
                major: Some("Mathematics".into()),
                ..UserPatch::default()
            })
            .expect("update");

        assert!(updated.profile_completed);
        assert_eq!(f.session.current(), Some(updated.clone()));
        assert_eq!(f.users.find_by_id(&student.id), Some(updated));
    }

    #[test]
    fn update_profile_without_session_fails() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());

        let err = f
            .session
            .update_profile(UserPatch::default())
            .expect_err("no session");
        assert!(matches!(err, StoreError::NotAuthenticated));
    }

    #[test]
    fn profile_entries_add_replace_remove() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        let student = add_student(&f.users);
        f.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");

        let edu = f
            .session
            .add_entry(Education {
                school: "Yale".into(),
                degree: "PhD".into(),
                field: "Mathematics".into(),
                ..Education::default()
            })
            .expect("add education");
        assert!(!edu.id.is_empty());

        let rust = f
            .session
            .add_entry(Skill {
                name: "Rust".into(),
                ..Skill::default()
            })
            .expect("add skill");
        f.session
            .add_entry(Skill {
                name: "COBOL".into(),
                ..Skill::default()
            })
            .expect("add skill");

        f.session
            .replace_entry(Education {
                gpa: Some("4.0".into()),
                ..edu.clone()
            })
            .expect("replace education");

        assert!(f.session.remove_entry::<Skill>(&rust.id).expect("remove"));
        assert!(!f.session.remove_entry::<Skill>(&rust.id).expect("remove again"));

        let stored = f.users.find_by_id(&student.id).expect("user");
        assert_eq!(stored.education.len(), 1);
        assert_eq!(stored.education[0].gpa.as_deref(), Some("4.0"));
        assert_eq!(
            stored.skills_list.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["COBOL"]
        );
        assert_eq!(f.session.current(), Some(stored));
    }

    #[test]
    fn replace_unknown_entry_is_not_found() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let f = fixture(tmp.path());
        f.users
            .insert(
                CompanySignup {
                    company_name: "Acme".into(),
                    email: "jobs@acme.test".into(),
                    password: "pw".into(),
                    ..CompanySignup::default()
                }
                .into(),
            )
            .expect("insert");
        f.session.login("jobs@acme.test", "pw", Role::Company).expect("login");

        let err = f
            .session
            .replace_entry(Skill {
                id: "missing".into(),
                name: "x".into(),
            })
            .expect_err("unknown entry");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn refresh_sees_foreign_logout() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let a = fixture(tmp.path());
        add_student(&a.users);
        a.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");

        let b = fixture(tmp.path());
        assert!(b.session.is_authenticated());
        b.session.logout().expect("logout");

        assert!(a.session.refresh().expect("refresh"));
        assert!(!a.session.is_authenticated());
        assert!(!a.session.refresh().expect("refresh"));
    }

    #[test]
    fn login_sees_users_registered_elsewhere() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let a = fixture(tmp.path());
        let b = fixture(tmp.path());
        add_student(&a.users);

        assert!(b.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login"));
    }

    #[test]
    fn entry_edits_keep_sections_written_elsewhere() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let a = fixture(tmp.path());
        add_student(&a.users);
        a.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");
        let b = fixture(tmp.path());

        a.session
            .add_entry(Skill {
                name: "COBOL".into(),
                ..Skill::default()
            })
            .expect("add in a");
        b.session
            .add_entry(Skill {
                name: "FLOW-MATIC".into(),
                ..Skill::default()
            })
            .expect("add in b");

        let names: Vec<String> = b
            .session
            .require()
            .expect("session")
            .skills_list
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["COBOL", "FLOW-MATIC"]);
    }

    #[test]
    fn profile_edit_after_foreign_logout_is_rejected() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let a = fixture(tmp.path());
        add_student(&a.users);
        a.session.login("grace@navy.mil", "cobol1959", Role::Student).expect("login");
        let b = fixture(tmp.path());
        b.session.logout().expect("logout");

        let err = a
            .session
            .update_profile(UserPatch::default())
            .expect_err("signed out elsewhere");
        assert!(matches!(err, StoreError::NotAuthenticated));
    }
}
