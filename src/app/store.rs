//! Shared reading store: the only state the two loops have in common.
//!
//! A single slot holding the latest validated [`Reading`], its sequence
//! number and a freshness flag.  Every access goes through a guard that
//! is acquired with a bounded wait: a caller that cannot get in within
//! the timeout gets [`StoreError::Unavailable`] and skips its work for
//! that cycle instead of blocking the other loop's schedule.
//!
//! The slot lives in a `Mutex<Option<Slot>>`.  Acquiring the guard takes
//! the slot out (leaving `None`), and dropping the guard puts it back and
//! wakes one waiter.  The inner mutex is only ever held for the take/put
//! itself, so the bounded wait lives entirely in `Condvar::wait_timeout_while`.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use log::warn;

use crate::error::StoreError;
use crate::sensors::Reading;

/// Lock wait used when nothing else is configured.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// What a reader gets back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSnapshot {
    pub reading: Reading,
    /// 0 until the first commit, then strictly increasing by one.
    pub sequence: u32,
    /// Set by a commit, cleared by the first [`SharedReadingStore::try_read`]
    /// that observes it.
    pub fresh: bool,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    latest: Reading,
    sequence: u32,
    fresh: bool,
}

/// Exclusive access to the slot.  Dropping it releases the store.
struct SlotGuard<'a> {
    store: &'a SharedReadingStore,
    slot: Slot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut cell = self
            .store
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cell = Some(self.slot);
        drop(cell);
        self.store.released.notify_one();
    }
}

pub struct SharedReadingStore {
    slot: Mutex<Option<Slot>>,
    released: Condvar,
    lock_timeout: Duration,
}

impl Default for SharedReadingStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl SharedReadingStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(Some(Slot {
                latest: Reading::UNAVAILABLE,
                sequence: 0,
                fresh: false,
            })),
            released: Condvar::new(),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn acquire(&self) -> Result<SlotGuard<'_>, StoreError> {
        let cell = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut cell, _) = self
            .released
            .wait_timeout_while(cell, self.lock_timeout, |slot| slot.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        match cell.take() {
            Some(slot) => Ok(SlotGuard { store: self, slot }),
            None => Err(StoreError::Unavailable),
        }
    }

    /// Replace the stored reading and mark it fresh.
    ///
    /// Only validated readings are accepted.  `sequence` is expected to be
    /// exactly one past the stored value; a gap is logged, not rejected.
    pub fn commit(&self, reading: Reading, sequence: u32) -> Result<(), StoreError> {
        if !reading.is_valid() {
            return Err(StoreError::InvalidReading);
        }
        let mut guard = self.acquire()?;
        let expected = guard.slot.sequence.wrapping_add(1);
        if sequence != expected {
            warn!(
                "Store: sequence gap (expected {}, got {})",
                expected, sequence
            );
        }
        guard.slot = Slot {
            latest: reading,
            sequence,
            fresh: true,
        };
        Ok(())
    }

    /// Copy out the latest reading and consume its freshness.
    ///
    /// A second read with no commit in between returns the same reading
    /// with `fresh == false`.
    pub fn try_read(&self) -> Result<StoreSnapshot, StoreError> {
        let mut guard = self.acquire()?;
        let snapshot = StoreSnapshot {
            reading: guard.slot.latest,
            sequence: guard.slot.sequence,
            fresh: guard.slot.fresh,
        };
        guard.slot.fresh = false;
        Ok(snapshot)
    }

    /// Copy out the latest reading without touching its freshness.
    pub fn try_peek(&self) -> Result<StoreSnapshot, StoreError> {
        let guard = self.acquire()?;
        Ok(StoreSnapshot {
            reading: guard.slot.latest,
            sequence: guard.slot.sequence,
            fresh: guard.slot.fresh,
        })
    }

    /// Hold the store for `hold`, blocking every other caller.
    ///
    /// Diagnostic aid for exercising the bounded-wait path.
    pub fn hold_for(&self, hold: Duration) -> Result<(), StoreError> {
        let _guard = self.acquire()?;
        std::thread::sleep(hold);
        Ok(())
    }
}
