//! Identifier allocation policies.
//!
//! Three policies coexist, chosen per collection:
//!
//! | Policy | Used by | Scheme |
//! |--------|---------|--------|
//! | [`Sequential`] | internships | `max(existing) + 1`, or `1` when empty |
//! | [`ShortRandomId`] | applications | uniform draw from `10000..=99999`, redrawn on collision |
//! | [`OpaqueId`] | users, profile entries | UUID v4 string |
//!
//! Every policy only guarantees uniqueness against the snapshot it is
//! handed. Two processes inserting at the same moment can still collide;
//! the last whole-collection write wins.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::StoreError;

/// Allocates a fresh identifier given the identifiers already in use.
pub trait IdPolicy<Id>: Send + Sync {
    /// Return an identifier not contained in `taken`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::IdSpaceExhausted`] if no free identifier can be found.
    fn next_id(&self, taken: &HashSet<Id>) -> Result<Id, StoreError>;
}

/// Monotonic integer identifiers: one past the current maximum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sequential;

impl IdPolicy<u64> for Sequential {
    fn next_id(&self, taken: &HashSet<u64>) -> Result<u64, StoreError> {
        match taken.iter().max() {
            None => Ok(1),
            Some(max) => max
                .checked_add(1)
                .ok_or(StoreError::IdSpaceExhausted { attempts: 1 }),
        }
    }
}

/// Default number of draws before [`ShortRandomId`] gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 64;

/// Five-digit identifiers that are short enough to read out over the phone.
pub const SHORT_ID_RANGE: RangeInclusive<u64> = 10_000..=99_999;

/// Random short identifiers with bounded collision retries.
///
/// Draws uniformly from [`SHORT_ID_RANGE`]; a draw that is already taken
/// is discarded and redrawn, up to `max_attempts` draws in total.
#[derive(Debug)]
pub struct ShortRandomId {
    max_attempts: u32,
    rng: Mutex<StdRng>,
}

impl ShortRandomId {
    /// Create a policy seeded from OS entropy.
    pub fn new(max_attempts: u32) -> Self {
        Self::with_rng(max_attempts, StdRng::from_entropy())
    }

    /// Create a policy driven by the given generator.
    pub fn with_rng(max_attempts: u32, rng: StdRng) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            rng: Mutex::new(rng),
        }
    }

    /// Maximum number of draws per allocation.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ShortRandomId {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl IdPolicy<u64> for ShortRandomId {
    fn next_id(&self, taken: &HashSet<u64>) -> Result<u64, StoreError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for attempt in 1..=self.max_attempts {
            let candidate = rng.gen_range(SHORT_ID_RANGE);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            tracing::warn!(candidate, attempt, "short id collision, redrawing");
        }
        Err(StoreError::IdSpaceExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Opaque string identifiers (UUID v4), assigned once and never reused.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueId;

impl IdPolicy<String> for OpaqueId {
    fn next_id(&self, taken: &HashSet<String>) -> Result<String, StoreError> {
        loop {
            let id = new_entry_id();
            if !taken.contains(&id) {
                return Ok(id);
            }
        }
    }
}

/// Identifier for an entry nested inside a user profile.
pub fn new_entry_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
