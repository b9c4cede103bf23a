//! # Upgradeable Connection Lock
//!
//! Each connection's mutable record sits behind one [`UpgradeLock`]. Packet
//! handlers never lock it directly; they receive a [`LazyGuard`] that starts
//! holding nothing and escalates on demand:
//!
//! ```text
//!            read()              upgrade() / write()
//! Released ─────────▶ Shared ─────────────────────▶ Exclusive
//!     ▲                 ▲  │                            │
//!     │                 │  └──────── release() ─────────┤
//!     │                 └────────── downgrade() ────────┘
//!     └──────────────────────────── release() ──────────┘
//! ```
//!
//! ## Upgrade protocol
//! Exclusive access is only granted through an upgrade of shared access, and
//! only one upgrade per lock may be in progress. The upgrader first claims the
//! lock's upgrade slot, then gives up its shared guard and waits for the
//! remaining readers to leave.
//!
//! When the slot is free the upgrade happens in place: no other writer can get
//! between the shared and exclusive phases, so everything read under the shared
//! guard is still current. When another upgrade already owns the slot, the
//! shared guard is dropped *before* waiting for the slot (holding it would
//! deadlock against the other upgrader, which is waiting for readers to drain).
//! In that case [`LazyGuard::upgrade`] reports [`Upgrade::Reacquired`] if a
//! write happened in between, and the caller must re-read what it relies on.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A reader/writer lock whose exclusive side is reached only by upgrading.
pub struct UpgradeLock<T> {
    inner: RwLock<T>,
    upgrade_slot: Mutex<()>,
    generation: AtomicU64,
}

impl<T> UpgradeLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
            upgrade_slot: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// A guard that holds nothing until first used.
    pub fn lazy(&self) -> LazyGuard<'_, T> {
        LazyGuard {
            lock: self,
            held: Held::Released,
        }
    }

    /// Short-lived shared access for code outside a handler (sweeps, snapshots).
    ///
    /// Recursive: succeeds while the calling thread already holds shared access
    /// through a [`LazyGuard`], even with a writer queued.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read_recursive()
    }

    /// Number of exclusive acquisitions so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: Default> Default for UpgradeLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for UpgradeLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeLock")
            .field("inner", &self.inner)
            .field("generation", &self.generation())
            .finish()
    }
}

/// What a [`LazyGuard`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Released,
    Shared,
    Exclusive,
}

/// Outcome of [`LazyGuard::upgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upgrade {
    /// No writer ran between the shared and exclusive phases.
    InPlace,
    /// Another writer ran first; values read under the shared guard may be stale.
    Reacquired,
}

enum Held<'a, T> {
    Released,
    Shared {
        guard: RwLockReadGuard<'a, T>,
        generation: u64,
    },
    // Field order matters: the write guard drops before the slot.
    Exclusive {
        guard: RwLockWriteGuard<'a, T>,
        _slot: MutexGuard<'a, ()>,
    },
}

/// A per-handler view of one [`UpgradeLock`].
///
/// Dropping the guard releases whatever it holds.
pub struct LazyGuard<'a, T> {
    lock: &'a UpgradeLock<T>,
    held: Held<'a, T>,
}

impl<'a, T> LazyGuard<'a, T> {
    pub fn access(&self) -> Access {
        match self.held {
            Held::Released => Access::Released,
            Held::Shared { .. } => Access::Shared,
            Held::Exclusive { .. } => Access::Exclusive,
        }
    }

    /// Shared access, acquired on first use.
    pub fn read(&mut self) -> &T {
        if let Held::Released = self.held {
            let (guard, generation) = self.acquire_shared();
            self.held = Held::Shared { guard, generation };
        }
        match &self.held {
            Held::Shared { guard, .. } => &**guard,
            Held::Exclusive { guard, .. } => &**guard,
            Held::Released => unreachable!("shared access acquired above"),
        }
    }

    /// Upgrades to exclusive access.
    ///
    /// Acquires shared access first if the guard holds nothing, so exclusive
    /// access always follows shared access. Blocks while other readers remain
    /// or another upgrade is in progress. A no-op when already exclusive.
    pub fn upgrade(&mut self) -> Upgrade {
        let (read_guard, seen) = match std::mem::replace(&mut self.held, Held::Released) {
            Held::Exclusive { guard, _slot } => {
                self.held = Held::Exclusive { guard, _slot };
                return Upgrade::InPlace;
            }
            Held::Shared { guard, generation } => (guard, generation),
            Held::Released => self.acquire_shared(),
        };

        let claimed = self.lock.upgrade_slot.try_lock();
        drop(read_guard);
        let slot = claimed.unwrap_or_else(|| self.lock.upgrade_slot.lock());

        let guard = self.lock.inner.write();
        let previous = self.lock.generation.fetch_add(1, Ordering::AcqRel);
        self.held = Held::Exclusive { guard, _slot: slot };

        if previous == seen {
            Upgrade::InPlace
        } else {
            Upgrade::Reacquired
        }
    }

    /// Exclusive access, upgrading if needed.
    pub fn write(&mut self) -> &mut T {
        self.upgrade();
        match &mut self.held {
            Held::Exclusive { guard, .. } => &mut **guard,
            _ => unreachable!("upgrade leaves the guard exclusive"),
        }
    }

    /// Gives up exclusive access but keeps shared access, atomically.
    ///
    /// Does nothing unless the guard is exclusive.
    pub fn downgrade(&mut self) {
        match std::mem::replace(&mut self.held, Held::Released) {
            Held::Exclusive { guard, _slot } => {
                let guard = RwLockWriteGuard::downgrade(guard);
                drop(_slot);
                self.held = Held::Shared {
                    guard,
                    generation: self.lock.generation(),
                };
            }
            other => self.held = other,
        }
    }

    /// Gives up everything. The next [`read`](Self::read) acquires again.
    pub fn release(&mut self) {
        self.held = Held::Released;
    }

    fn acquire_shared(&self) -> (RwLockReadGuard<'a, T>, u64) {
        let guard = self.lock.inner.read();
        // Stable while the read guard is held; writers bump it under the write lock.
        let generation = self.lock.generation();
        (guard, generation)
    }
}

impl<T> fmt::Debug for LazyGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyGuard")
            .field("access", &self.access())
            .finish()
    }
}
