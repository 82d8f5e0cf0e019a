use std::sync::{Condvar, Mutex, MutexGuard};

use log::{debug, trace};

use crate::constants::NUM_PARTITIONS;

struct LockState {
    exclusive: bool,
    partitions: [bool; NUM_PARTITIONS],
}

impl LockState {
    fn any_partition_held(&self) -> bool {
        self.partitions.iter().any(|&p| p)
    }
}

/// Coordinates the store-wide exclusive lock and the key-derived partition
/// locks shared by every handle on one store.
///
/// The exclusive lock excludes everything; a partition lock excludes the
/// exclusive lock and its own partition only, so reads on unrelated key
/// ranges proceed concurrently. Acquisition blocks until granted; there is
/// no try variant at this layer.
pub(crate) struct LockCoordinator {
    state: Mutex<LockState>,
    cond: Condvar,
}

impl LockCoordinator {
    pub(crate) fn new() -> Self {
        LockCoordinator {
            state: Mutex::new(LockState {
                exclusive: false,
                partitions: [false; NUM_PARTITIONS],
            }),
            cond: Condvar::new(),
        }
    }

    fn guard(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Block until the store-wide exclusive lock is held.
    pub(crate) fn lock_exclusive(&self) {
        let mut state = self.guard();
        while state.exclusive || state.any_partition_held() {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.exclusive = true;
        debug!("acquired exclusive store lock");
    }

    pub(crate) fn unlock_exclusive(&self) {
        let mut state = self.guard();
        state.exclusive = false;
        drop(state);
        self.cond.notify_all();
        debug!("released exclusive store lock");
    }

    /// Partition index for a key hash.
    pub(crate) fn partition_of(hash: u64) -> usize {
        (hash % NUM_PARTITIONS as u64) as usize
    }

    /// Block until the given partition lock is held.
    pub(crate) fn lock_partition(&self, partition: usize) {
        let mut state = self.guard();
        while state.exclusive || state.partitions[partition] {
            state = self.cond.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.partitions[partition] = true;
        trace!("acquired partition lock {}", partition);
    }

    pub(crate) fn unlock_partition(&self, partition: usize) {
        let mut state = self.guard();
        state.partitions[partition] = false;
        drop(state);
        self.cond.notify_all();
        trace!("released partition lock {}", partition);
    }
}
