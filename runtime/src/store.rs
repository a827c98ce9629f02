//! Per-journey serialized access to the repository.
//!
//! The [`JourneyStore`] sits between the service and the durable
//! [`JourneyRepository`]. It owns a lock table with one `RwLock` per journey id:
//!
//! - mutations of the same journey run one at a time, in arrival order of the lock
//! - mutations of different journeys never wait on each other
//! - reads share the lock, so they never observe a half-applied mutation
//!
//! Lock entries are created on first use and removed once nobody holds or waits on
//! them, so the table only ever holds journeys that are currently being touched.
//!
//! A [`Mutation`] keeps the write lock until it is dropped. The service publishes the
//! new snapshot while holding it, which makes the publish order of a journey equal
//! to its persist order.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use journey_tracker_core::{
    Journey, JourneyError, JourneyId, JourneyRepository, Transition, UserId,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// A lock and the number of guards holding or waiting on it.
struct Slot {
    lock: Arc<RwLock<()>>,
    users: usize,
}

type LockEntries = Arc<DashMap<JourneyId, Slot>>;

/// Lock table keyed by journey id.
#[derive(Clone, Default)]
struct LockTable {
    entries: LockEntries,
}

impl LockTable {
    /// Register a user of the id's lock before anyone waits on it.
    fn lease(&self, id: &JourneyId) -> (Lease, Arc<RwLock<()>>) {
        let mut slot = self.entries.entry(id.clone()).or_insert_with(|| Slot {
            lock: Arc::new(RwLock::new(())),
            users: 0,
        });
        slot.users += 1;
        let lock = Arc::clone(&slot.lock);
        drop(slot);

        let lease = Lease {
            id: id.clone(),
            entries: Arc::clone(&self.entries),
        };
        (lease, lock)
    }

    async fn read(&self, id: &JourneyId) -> LockGuard {
        let (lease, lock) = self.lease(id);
        let held = Held::Read(lock.read_owned().await);
        LockGuard { held, lease }
    }

    async fn write(&self, id: &JourneyId) -> LockGuard {
        let (lease, lock) = self.lease(id);
        let held = Held::Write(lock.write_owned().await);
        LockGuard { held, lease }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// One registered user of a lock entry, waiting or holding.
///
/// Dropping the last lease of an id removes its entry, including when the wait
/// for the lock is abandoned before it is acquired.
struct Lease {
    id: JourneyId,
    entries: LockEntries,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Entry::Occupied(mut slot) = self.entries.entry(self.id.clone()) {
            slot.get_mut().users -= 1;
            if slot.get().users == 0 {
                slot.remove();
            }
        }
    }
}

enum Held {
    Read(OwnedRwLockReadGuard<()>),
    Write(OwnedRwLockWriteGuard<()>),
}

/// A held per-journey lock.
///
/// Fields drop in order: the lock is released before the lease.
pub(crate) struct LockGuard {
    held: Held,
    lease: Lease,
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.held {
            Held::Read(_) => "read",
            Held::Write(_) => "write",
        };
        f.debug_struct("LockGuard")
            .field("id", &self.lease.id)
            .field("mode", &mode)
            .finish()
    }
}

/// Result of [`JourneyStore::mutate_if_owner`].
///
/// Holds the journey's write lock until dropped.
#[derive(Debug)]
pub struct Mutation {
    /// The journey after the mutation (the unchanged journey for a no-op)
    pub journey: Journey,
    /// Whether anything was persisted
    pub changed: bool,
    _guard: LockGuard,
}

impl Mutation {
    /// Release the write lock and return the journey.
    #[must_use]
    pub fn into_journey(self) -> Journey {
        self.journey
    }
}

/// Journey storage with per-id serialization.
#[derive(Clone)]
pub struct JourneyStore {
    repository: Arc<dyn JourneyRepository>,
    locks: LockTable,
}

impl JourneyStore {
    /// Create a store over a repository.
    #[must_use]
    pub fn new(repository: Arc<dyn JourneyRepository>) -> Self {
        Self {
            repository,
            locks: LockTable::default(),
        }
    }

    /// Persist a freshly created journey.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::Unexpected`] if the repository insert fails.
    pub async fn create(&self, journey: &Journey) -> Result<(), JourneyError> {
        let _guard = self.locks.write(&journey.id).await;
        self.repository.create_journey(journey).await?;
        Ok(())
    }

    /// Read the current state of a journey.
    ///
    /// # Errors
    ///
    /// Returns [`JourneyError::NotFound`] for an unknown id, or
    /// [`JourneyError::Unexpected`] on a storage fault.
    pub async fn get(&self, id: &JourneyId) -> Result<Journey, JourneyError> {
        let _guard = self.locks.read(id).await;
        self.load(id).await
    }

    /// Read-modify-write a journey on behalf of its owner.
    ///
    /// Under the journey's write lock: load it, reject a requester who is not the
    /// owner, ask `decide` for a [`Transition`] and persist the change. Position is
    /// always written before status, so a failure between the two writes can never
    /// leave a completed journey that still has a position.
    ///
    /// The returned [`Mutation`] still holds the lock.
    ///
    /// # Errors
    ///
    /// - [`JourneyError::NotFound`] if the journey does not exist
    /// - [`JourneyError::Unauthorized`] if `requester` is not the owner
    /// - whatever `decide` returns
    /// - [`JourneyError::Unexpected`] on a storage fault
    pub async fn mutate_if_owner<F>(
        &self,
        id: &JourneyId,
        requester: &UserId,
        decide: F,
    ) -> Result<Mutation, JourneyError>
    where
        F: FnOnce(&Journey) -> Result<Transition, JourneyError> + Send,
    {
        let guard = self.locks.write(id).await;
        let current = self.load(id).await?;

        if !current.is_owned_by(requester) {
            tracing::debug!(journey_id = %id, requester = %requester, "Mutation by non-owner rejected");
            return Err(JourneyError::Unauthorized);
        }

        match decide(&current)? {
            Transition::Unchanged => Ok(Mutation {
                journey: current,
                changed: false,
                _guard: guard,
            }),
            Transition::Changed(next) => {
                self.repository.update_position(id, next.position).await?;
                if next.status != current.status {
                    self.repository.update_status(id, next.status).await?;
                }
                Ok(Mutation {
                    journey: next,
                    changed: true,
                    _guard: guard,
                })
            }
        }
    }

    /// Take the shared lock of a journey without reading it.
    pub(crate) async fn read_lock(&self, id: &JourneyId) -> LockGuard {
        self.locks.read(id).await
    }

    /// Load from the repository; callers hold the lock.
    pub(crate) async fn load(&self, id: &JourneyId) -> Result<Journey, JourneyError> {
        Ok(self.repository.get_journey(id).await?)
    }

    /// Number of journeys with a live lock entry.
    #[must_use]
    pub fn locked_journeys(&self) -> usize {
        self.locks.len()
    }
}

impl fmt::Debug for JourneyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JourneyStore")
            .field("locked_journeys", &self.locks.len())
            .finish_non_exhaustive()
    }
}
