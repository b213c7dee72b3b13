use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// In-process booking locks keyed by therapist and calendar day.
///
/// `book` and `accept` hold the day's lock across their
/// conflict-check-then-write sequence, so two concurrent requests for
/// the same therapist/day serialize instead of both passing the check
/// and both committing.
pub struct SlotLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

static REGISTRY: OnceLock<SlotLockRegistry> = OnceLock::new();

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn global() -> &'static SlotLockRegistry {
        REGISTRY.get_or_init(SlotLockRegistry::new)
    }

    fn lock_key(therapist_id: Uuid, date: NaiveDate) -> String {
        format!("booking:{}:{}", therapist_id, date)
    }

    pub async fn acquire(&self, therapist_id: Uuid, date: NaiveDate) -> OwnedMutexGuard<()> {
        let slot_lock = {
            let mut locks = self.locks.lock().await;
            // Held guards and pending waiters each keep their own Arc
            // clone alive; an entry at refcount one is a released lock.
            // Dropping those keeps the map bounded by live contention
            // instead of growing with every key ever booked.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(Self::lock_key(therapist_id, date))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        slot_lock.lock_owned().await
    }

    /// Number of keys currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}

impl Default for SlotLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
