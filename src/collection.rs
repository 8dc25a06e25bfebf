//! Generic collection store: one durable, ordered sequence of records.
//!
//! Every mutation first reloads the entry if another process changed it,
//! then computes the new sequence, rewrites the whole entry, swaps the
//! in-memory snapshot and publishes on the record's channel. Writers in
//! different processes racing between reload and rename follow
//! last-write-wins at the granularity of the whole entry.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::bus::{ChangeBus, Origin};
use crate::error::StoreError;
use crate::ids::IdPolicy;
use crate::record::Record;
use crate::storage::{EntryDigest, StorageLayout, digest};
use crate::watch::WatchTarget;

struct Snapshot<R> {
    records: Vec<R>,
    /// Digest of the entry as last written or loaded by this store.
    digest: Option<EntryDigest>,
}

struct Inner<R: Record> {
    layout: StorageLayout,
    bus: ChangeBus,
    ids: Box<dyn IdPolicy<R::Id>>,
    snapshot: RwLock<Snapshot<R>>,
}

/// Durable store for one record type.
///
/// `Clone` is cheap; clones share the same in-memory snapshot.
pub struct Collection<R: Record> {
    inner: Arc<Inner<R>>,
}

impl<R: Record> Clone for Collection<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Record> fmt::Debug for Collection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("collection", &R::COLLECTION)
            .field("len", &self.len())
            .finish()
    }
}

impl<R: Record> Collection<R> {
    /// Open the collection and load its current contents.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] if the stored entry cannot be
    /// decoded, or [`StoreError::Io`] if it cannot be read.
    pub fn open(
        layout: StorageLayout,
        bus: ChangeBus,
        ids: impl IdPolicy<R::Id> + 'static,
    ) -> Result<Self, StoreError> {
        let collection = Self {
            inner: Arc::new(Inner {
                layout,
                bus,
                ids: Box::new(ids),
                snapshot: RwLock::new(Snapshot {
                    records: Vec::new(),
                    digest: None,
                }),
            }),
        };
        collection.load_all()?;
        Ok(collection)
    }

    /// Re-read the full collection from storage, replacing the in-memory
    /// snapshot.
    ///
    /// # Returns
    ///
    /// The loaded records; empty if the entry has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] for undecodable data. The in-memory
    /// snapshot is left untouched in that case.
    pub fn load_all(&self) -> Result<Vec<R>, StoreError> {
        let mut snapshot = self.write_snapshot();
        let (records, entry_digest) = self.read_entry()?;
        snapshot.records = records.clone();
        snapshot.digest = entry_digest;
        tracing::debug!(collection = R::COLLECTION, count = records.len(), "loaded");
        Ok(records)
    }

    /// Reload the entry if another process wrote it since this store last
    /// wrote or loaded it.
    ///
    /// A reload is published with [`Origin::External`].
    ///
    /// # Returns
    ///
    /// `true` if the snapshot was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Malformed`] for undecodable data; the snapshot
    /// is kept in that case.
    pub fn refresh(&self) -> Result<bool, StoreError> {
        let reloaded = {
            let mut snapshot = self.write_snapshot();
            self.reload_locked(&mut snapshot)?
        };
        if reloaded {
            self.inner.bus.publish(R::CHANNEL, Origin::External);
        }
        Ok(reloaded)
    }

    /// Append a new record, allocating its identifier.
    ///
    /// # Returns
    ///
    /// The stored record, identifier included.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdSpaceExhausted`] if no identifier could be
    /// allocated, or an I/O / encoding error if the write fails. Nothing is
    /// published on failure.
    pub fn insert(&self, draft: R::Draft) -> Result<R, StoreError> {
        self.try_insert(draft, |_, _| Ok(()))
    }

    /// Like [`insert`](Collection::insert), but `check` sees the freshly
    /// reloaded records first and may reject the draft. Uniqueness rules
    /// that span records belong here.
    ///
    /// # Errors
    ///
    /// Returns whatever `check` returns; nothing is written in that case.
    pub fn try_insert<F>(&self, draft: R::Draft, check: F) -> Result<R, StoreError>
    where
        F: FnOnce(&[R], &R::Draft) -> Result<(), StoreError>,
    {
        let record = {
            let mut snapshot = self.write_snapshot();
            self.reload_locked(&mut snapshot)?;
            check(&snapshot.records, &draft)?;

            let taken: HashSet<R::Id> = snapshot.records.iter().map(|r| r.id().clone()).collect();
            let id = self.inner.ids.next_id(&taken)?;
            let record = R::from_draft(id, draft);

            let mut records = snapshot.records.clone();
            records.push(record.clone());
            snapshot.digest = self.persist(&records)?;
            snapshot.records = records;
            record
        };

        tracing::debug!(collection = R::COLLECTION, id = %record.id(), "inserted");
        self.inner.bus.publish(R::CHANNEL, Origin::Local);
        Ok(record)
    }

    /// Shallow-merge `patch` into the record with the given identifier.
    ///
    /// # Returns
    ///
    /// The record after the merge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has this identifier;
    /// storage is not touched and nothing is published.
    pub fn update(&self, id: &R::Id, patch: R::Patch) -> Result<R, StoreError> {
        self.try_update(id, |_| Ok(patch))
    }

    /// Like [`update`](Collection::update), but the patch is derived from the
    /// current record while the collection is locked, so checks made by
    /// `decide` cannot be invalidated by another writer in this process.
    ///
    /// # Errors
    ///
    /// Returns whatever `decide` returns, [`StoreError::NotFound`] for an
    /// unknown identifier, or an I/O / encoding error.
    pub fn try_update<F>(&self, id: &R::Id, decide: F) -> Result<R, StoreError>
    where
        F: FnOnce(&R) -> Result<R::Patch, StoreError>,
    {
        let updated = {
            let mut snapshot = self.write_snapshot();
            self.reload_locked(&mut snapshot)?;
            let pos = snapshot
                .records
                .iter()
                .position(|r| r.id() == id)
                .ok_or_else(|| StoreError::not_found(R::COLLECTION, id))?;

            let mut records = snapshot.records.clone();
            let patch = decide(&records[pos])?;
            records[pos].merge(patch);
            let updated = records[pos].clone();

            snapshot.digest = self.persist(&records)?;
            snapshot.records = records;
            updated
        };

        tracing::debug!(collection = R::COLLECTION, id = %id, "updated");
        self.inner.bus.publish(R::CHANNEL, Origin::Local);
        Ok(updated)
    }

    /// Remove the record with the given identifier.
    ///
    /// The entry is rewritten and a notice published even if no record
    /// matched.
    ///
    /// # Returns
    ///
    /// `false` only if the write failed; the failure is logged. An unknown
    /// identifier still yields `true`.
    pub fn remove(&self, id: &R::Id) -> bool {
        let outcome = {
            let mut snapshot = self.write_snapshot();
            if let Err(e) = self.reload_locked(&mut snapshot) {
                tracing::error!(
                    collection = R::COLLECTION,
                    id = %id,
                    error = %e,
                    "failed to reload before remove"
                );
                return false;
            }
            let records: Vec<R> = snapshot
                .records
                .iter()
                .filter(|r| r.id() != id)
                .cloned()
                .collect();
            let removed = records.len() != snapshot.records.len();
            self.persist(&records).map(|entry_digest| {
                snapshot.digest = entry_digest;
                snapshot.records = records;
                removed
            })
        };

        match outcome {
            Ok(removed) => {
                tracing::debug!(collection = R::COLLECTION, id = %id, removed, "removed");
                self.inner.bus.publish(R::CHANNEL, Origin::Local);
                true
            }
            Err(e) => {
                tracing::error!(
                    collection = R::COLLECTION,
                    id = %id,
                    error = %e,
                    "failed to remove record"
                );
                false
            }
        }
    }

    /// Look up a record in the current snapshot.
    pub fn find_by_id(&self, id: &R::Id) -> Option<R> {
        self.read_snapshot()
            .records
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    /// All records matching `predicate`, in collection order.
    pub fn find_all_where<P>(&self, predicate: P) -> Vec<R>
    where
        P: Fn(&R) -> bool,
    {
        self.read_snapshot()
            .records
            .iter()
            .filter(|&r| predicate(r))
            .cloned()
            .collect()
    }

    /// Whether any record matches `predicate`.
    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&R) -> bool,
    {
        self.read_snapshot().records.iter().any(predicate)
    }

    /// A copy of the whole snapshot.
    pub fn all(&self) -> Vec<R> {
        self.read_snapshot().records.clone()
    }

    pub fn len(&self) -> usize {
        self.read_snapshot().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the snapshot with the stored entry if their digests differ.
    /// The caller holds the write lock.
    fn reload_locked(&self, snapshot: &mut Snapshot<R>) -> Result<bool, StoreError> {
        let bytes = self.inner.layout.read(R::COLLECTION)?;
        let entry_digest = digest(bytes.as_deref());
        if entry_digest == snapshot.digest {
            return Ok(false);
        }
        let records = decode(bytes)?;
        tracing::debug!(
            collection = R::COLLECTION,
            count = records.len(),
            "reloaded after foreign write"
        );
        snapshot.records = records;
        snapshot.digest = entry_digest;
        Ok(true)
    }

    fn read_entry(&self) -> Result<(Vec<R>, Option<EntryDigest>), StoreError> {
        let bytes = self.inner.layout.read(R::COLLECTION)?;
        let entry_digest = digest(bytes.as_deref());
        Ok((decode(bytes)?, entry_digest))
    }

    fn persist(&self, records: &[R]) -> Result<Option<EntryDigest>, StoreError> {
        let bytes = serde_json::to_vec(records).map_err(|source| StoreError::Encode {
            entry: R::COLLECTION,
            source,
        })?;
        self.inner.layout.write(R::COLLECTION, &bytes)?;
        Ok(digest(Some(&bytes)))
    }

    fn read_snapshot(&self) -> RwLockReadGuard<'_, Snapshot<R>> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_snapshot(&self) -> RwLockWriteGuard<'_, Snapshot<R>> {
        self.inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode<R: Record>(bytes: Option<Vec<u8>>) -> Result<Vec<R>, StoreError> {
    match bytes {
        None => Ok(Vec::new()),
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
            entry: R::COLLECTION,
            source,
        }),
    }
}

impl<R: Record> WatchTarget for Collection<R> {
    fn entry(&self) -> &'static str {
        R::COLLECTION
    }

    fn refresh(&self) -> Result<bool, StoreError> {
        Collection::refresh(self)
    }
}
