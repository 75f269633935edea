use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

// One mutex per entity id. An entry lives while any holder or waiter counts
// against it; waiters count from before they suspend so cancellation releases them.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<Uuid, LockEntry>,
}

#[derive(Default)]
struct LockEntry {
    mutex: Arc<Mutex<()>>,
    users: AtomicUsize,
}

struct Slot<'a> {
    key: Uuid,
    owner: &'a KeyedLocks,
}

// Field order matters: the mutex is released before the slot gives up the entry.
pub struct KeyGuard<'a> {
    _guard: OwnedMutexGuard<()>,
    _slot: Slot<'a>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: Uuid) -> KeyGuard<'_> {
        let mutex = {
            let entry = self.locks.entry(key).or_default();
            entry.users.fetch_add(1, Ordering::AcqRel);
            entry.mutex.clone()
        };
        let slot = Slot { key, owner: self };

        let guard = mutex.lock_owned().await;

        KeyGuard {
            _guard: guard,
            _slot: slot,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        // Increments happen under the same shard lock, so the count is exact here.
        self.owner.locks.remove_if(&self.key, |_, entry| {
            entry.users.fetch_sub(1, Ordering::AcqRel) == 1
        });
    }
}
