// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Exclusive per-thread ownership of a single object.
//!
//! Ownership is not a lock: it is a flag recorded under the object's mutex
//! that names the thread allowed to mutate the object. The mutex is only held
//! for the duration of an ownership transition, while the ownership itself can
//! last across any number of calls. Ownership is not depth counted: a thread
//! that already owns an object succeeds at taking it again, and a single
//! release clears it.

#[cfg(feature = "stats")]
use core::sync::atomic::{AtomicU64, Ordering};
use core::{marker::PhantomData, ops::Deref};
use std::thread::ThreadId;

use crate::{
    object::{BaseObject, StateGuard},
    util::current_thread,
};

/// Statistics for ownership operations (available with `stats` feature).
#[cfg(feature = "stats")]
#[derive(Debug, Default)]
pub struct OwnershipStats {
    /// Total number of ownership claims
    pub total_claims: AtomicU64,
    /// Total number of non-blocking attempts that found the object busy
    pub total_busy: AtomicU64,
    /// Total number of times a thread blocked waiting for ownership
    pub total_blocks: AtomicU64,
}

/// State protected by an object's mutex.
#[derive(Debug)]
pub(crate) struct OwnerState {
    owner: Option<ThreadId>,
}

impl OwnerState {
    pub(crate) const fn new() -> Self {
        Self { owner: None }
    }

    #[inline]
    pub(crate) fn owner(&self) -> Option<ThreadId> {
        self.owner
    }
}

/// Outcome of a single ownership attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The calling thread already was the owner.
    Held,
    /// The calling thread became the owner.
    Claimed,
    /// Another thread owns the object.
    Busy,
}

/// The locked state of an object.
///
/// Holding an `ObjectLock` means holding the object's mutex. Ownership
/// transitions done through it do not take the mutex again, and it is the
/// only way to [`wait`](ObjectLock::wait) on, or [`notify`](ObjectLock::notify),
/// the object's condition variable.
pub struct ObjectLock<'a> {
    obj: &'a BaseObject,
    guard: StateGuard<'a>,
}

impl<'a> ObjectLock<'a> {
    /// Returns the locked object.
    #[inline]
    pub fn object(&self) -> &'a BaseObject {
        self.obj
    }

    /// Returns the current owner.
    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.guard.owner
    }

    /// Takes ownership of the object for the calling thread.
    ///
    /// Succeeds immediately if the calling thread already owns the object or
    /// nobody does. Otherwise returns `false` if `wait` is `false`, or blocks
    /// until the owner releases the object. The mutex is released while
    /// blocked.
    pub fn take_ownership(&mut self, wait: bool) -> bool {
        self.claim(wait) != Claim::Busy
    }

    pub(crate) fn claim(&mut self, wait: bool) -> Claim {
        self.obj.check_valid("take ownership");
        let current = current_thread();

        match self.guard.owner {
            Some(owner) if owner == current => return Claim::Held,
            None => {}
            Some(owner) => {
                if !wait {
                    #[cfg(feature = "stats")]
                    self.obj.stats.total_busy.fetch_add(1, Ordering::Relaxed);
                    return Claim::Busy;
                }

                #[cfg(feature = "stats")]
                self.obj.stats.total_blocks.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "object {:p}: {:?} waits for ownership held by {:?}",
                    self.obj,
                    current,
                    owner
                );
                while self.guard.owner.is_some() {
                    self.obj.cond.wait(&mut self.guard);
                }
                // The owner may have destroyed the object before waking us.
                self.obj.check_valid("take ownership");
            }
        }

        self.guard.owner = Some(current);
        #[cfg(feature = "stats")]
        self.obj.stats.total_claims.fetch_add(1, Ordering::Relaxed);
        log::trace!("object {:p}: owned by {:?}", self.obj, current);
        Claim::Claimed
    }

    /// Releases the calling thread's ownership and wakes up all waiters.
    ///
    /// Releasing an object that has no owner is tolerated and only logged.
    ///
    /// Releasing an object owned by another thread is a fatal contract
    /// violation.
    pub fn release_ownership(&mut self) {
        self.obj.check_valid("release ownership");
        let current = current_thread();

        match self.guard.owner {
            Some(owner) if owner == current => {}
            // TODO: find out whether anything but a double release reaches this
            // and make it fatal if nothing does.
            None => log::warn!(
                "object {:p}: {:?} released ownership of an unowned object",
                self.obj,
                current
            ),
            Some(owner) => violation!(
                "object {:p}: {:?} tried to release ownership held by {:?}",
                self.obj,
                current,
                owner
            ),
        }

        self.guard.owner = None;
        // Ownership contenders share the condition variable with other
        // waiters, so everyone has to be woken up.
        self.obj.cond.notify_all();
        log::trace!("object {:p}: released by {:?}", self.obj, current);
    }

    /// Blocks on the object's condition variable.
    ///
    /// The mutex is released while blocked and held again on return. Wakeups
    /// may be spurious: re-check the awaited state in a loop.
    pub fn wait(&mut self) {
        self.obj.check_valid("wait");
        self.obj.cond.wait(&mut self.guard);
    }

    /// Wakes up every thread blocked on the object's condition variable.
    pub fn notify(&self) {
        self.obj.check_valid("notify");
        self.obj.cond.notify_all();
    }
}

impl BaseObject {
    /// Locks the object's mutex.
    ///
    /// Locking a destroyed object is a fatal contract violation.
    pub fn lock(&self) -> ObjectLock<'_> {
        self.check_valid("lock");
        ObjectLock {
            obj: self,
            guard: self.state.lock(),
        }
    }

    /// Takes ownership of the object for the calling thread.
    ///
    /// The mutex is only held for the duration of the call. See
    /// [`ObjectLock::take_ownership`].
    pub fn take_ownership(&self, wait: bool) -> bool {
        self.lock().take_ownership(wait)
    }

    /// Releases the calling thread's ownership. See
    /// [`ObjectLock::release_ownership`].
    pub fn release_ownership(&self) {
        self.lock().release_ownership()
    }

    /// Returns the current owner.
    ///
    /// The value may be stale as soon as it is returned unless the calling
    /// thread is the owner.
    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// Returns `true` if the calling thread owns the object.
    pub fn is_owned_by_current(&self) -> bool {
        self.owner() == Some(current_thread())
    }

    /// Takes ownership, blocking if needed, and returns a guard that releases
    /// it on drop.
    ///
    /// If the calling thread already owned the object, the guard leaves it
    /// owned on drop.
    pub fn own(&self) -> Ownership<'_> {
        let claim = self.lock().claim(true);
        Ownership::new(self, claim == Claim::Claimed)
    }

    /// Takes ownership if nobody else holds it.
    pub fn try_own(&self) -> Option<Ownership<'_>> {
        match self.lock().claim(false) {
            Claim::Busy => None,
            claim => Some(Ownership::new(self, claim == Claim::Claimed)),
        }
    }

    /// Gets the ownership statistics (only available with `stats` feature).
    ///
    /// Returns `(total_claims, total_busy, total_blocks)`.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.total_claims.load(Ordering::Relaxed),
            self.stats.total_busy.load(Ordering::Relaxed),
            self.stats.total_blocks.load(Ordering::Relaxed),
        )
    }

    /// Resets all statistics counters (only available with `stats` feature).
    #[cfg(feature = "stats")]
    pub fn reset_stats(&self) {
        self.stats.total_claims.store(0, Ordering::Relaxed);
        self.stats.total_busy.store(0, Ordering::Relaxed);
        self.stats.total_blocks.store(0, Ordering::Relaxed);
    }
}

/// RAII guard for the ownership of an object.
///
/// Ownership belongs to a thread, so the guard cannot be sent to another one.
/// Dropping it releases the ownership only if the guard took it; a guard
/// created while the thread already owned the object leaves it owned.
#[must_use = "ownership is released as soon as the guard is dropped"]
pub struct Ownership<'a> {
    obj: &'a BaseObject,
    claimed: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a> Ownership<'a> {
    fn new(obj: &'a BaseObject, claimed: bool) -> Self {
        Self {
            obj,
            claimed,
            _not_send: PhantomData,
        }
    }
}

impl Deref for Ownership<'_> {
    type Target = BaseObject;

    fn deref(&self) -> &BaseObject {
        self.obj
    }
}

impl Drop for Ownership<'_> {
    fn drop(&mut self) {
        if self.claimed {
            self.obj.release_ownership();
        }
    }
}
