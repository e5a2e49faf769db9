// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! The base record embedded in every runtime resource object.

use core::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::{Condvar, RawMutex};

#[cfg(feature = "stats")]
use crate::owner::OwnershipStats;
use crate::{link::IntrusiveLink, owner::OwnerState};

/// Mutex guarding the owner field of a [`BaseObject`].
pub(crate) type StateMutex = lock_api::Mutex<RawMutex, OwnerState>;
/// Guard of a [`StateMutex`].
pub(crate) type StateGuard<'a> = lock_api::MutexGuard<'a, RawMutex, OwnerState>;

const INVALID_MAGIC: u64 = 0xFEFE_FEFE_FEFE_FEFE;

/// Validity tag of a resource object.
///
/// Every resource kind picks its own magic. A destroyed object carries a
/// reserved invalid magic instead, which no kind can use.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic(u64);

impl Magic {
    /// The tag of a destroyed object.
    pub const INVALID: Magic = Magic(INVALID_MAGIC);

    /// Creates the magic of a resource kind.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is the reserved invalid magic.
    pub const fn new(raw: u64) -> Self {
        assert!(raw != INVALID_MAGIC, "the invalid object magic is reserved");
        Self(raw)
    }

    /// Returns the raw tag value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is the tag of a destroyed object.
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_MAGIC
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Magic({:#018x})", self.0)
        } else {
            f.write_str("Magic(INVALID)")
        }
    }
}

/// Kind-specific dispatch capability bound to an object at init.
///
/// Higher layers implement this on their static dispatch tables. The base
/// object stores the reference and hands it back, nothing more.
pub trait Dispatch: Send + Sync {
    /// Name of the dispatch table, used in diagnostics.
    fn name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// The base record of a resource object.
///
/// It provides reference counted lifetime tracking, a validity tag that turns
/// use-after-destroy into a detected contract violation, and exclusive
/// per-thread ownership (see [`BaseObject::take_ownership`] and
/// [`take_multi_ownership`](crate::take_multi_ownership)).
pub struct BaseObject {
    magic: AtomicU64,
    refs: AtomicUsize,
    dispatch: &'static dyn Dispatch,
    link: IntrusiveLink,
    pub(crate) state: StateMutex,
    pub(crate) cond: Condvar,
    #[cfg(feature = "stats")]
    pub(crate) stats: OwnershipStats,
}

impl BaseObject {
    /// Initializes a live object of the kind tagged by `magic`.
    ///
    /// The object starts with one reference, no owner, and a detached link.
    pub fn new(magic: Magic, dispatch: &'static dyn Dispatch) -> Self {
        Self {
            magic: AtomicU64::new(magic.raw()),
            refs: AtomicUsize::new(1),
            dispatch,
            link: IntrusiveLink::new(),
            state: StateMutex::new(OwnerState::new()),
            cond: Condvar::new(),
            #[cfg(feature = "stats")]
            stats: OwnershipStats::default(),
        }
    }

    /// Marks the object as destroyed.
    ///
    /// The object must have no references left, be live, have no owner and be
    /// detached from any collection. Each broken precondition is logged and
    /// terminates the process. All checks run under the object's mutex, so
    /// of two racing destroys only one can succeed.
    pub fn destroy(&self) {
        let state = self.state.lock();

        let refs = self.ref_count();
        if refs != 0 {
            violation!(
                "object {:p}: destroy called with {} reference(s) left",
                self,
                refs
            );
        }

        if !self.is_valid() {
            violation!("object {:p}: destroy called on a dead object", self);
        }

        if let Some(owner) = state.owner() {
            violation!(
                "object {:p}: destroy called while still owned by {:?}",
                self,
                owner
            );
        }

        if let Some(parent) = self.link.parent() {
            violation!(
                "object {:p}: destroy called while still a member of {:?}",
                self,
                parent
            );
        }

        self.magic.store(INVALID_MAGIC, Ordering::Release);
        drop(state);
        log::trace!("object {:p}: destroyed", self);
    }

    /// Returns the current validity tag.
    #[inline]
    pub fn magic(&self) -> Magic {
        Magic(self.magic.load(Ordering::Acquire))
    }

    /// Returns `true` between init and destroy.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic().is_valid()
    }

    /// Returns `true` if the object is live and of the kind tagged `magic`.
    #[inline]
    pub fn has_magic(&self, magic: Magic) -> bool {
        magic.is_valid() && self.magic() == magic
    }

    /// Returns the current reference count.
    #[inline]
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    /// Returns the reference counter, for the code that retains and releases
    /// the object.
    #[inline]
    pub fn refs(&self) -> &AtomicUsize {
        &self.refs
    }

    /// Returns the dispatch capability bound at init.
    #[inline]
    pub fn dispatch(&self) -> &'static dyn Dispatch {
        self.dispatch
    }

    /// Returns the collection membership marker.
    #[inline]
    pub fn link(&self) -> &IntrusiveLink {
        &self.link
    }

    /// Terminates unless the object is live.
    #[inline]
    pub(crate) fn check_valid(&self, op: &str) {
        if !self.is_valid() {
            violation!("object {:p}: {} on a dead object", self, op);
        }
    }
}

impl fmt::Debug for BaseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("BaseObject");
        d.field("magic", &self.magic())
            .field("refs", &self.ref_count())
            .field("dispatch", &self.dispatch.name());
        // The caller may be holding the lock itself.
        match self.state.try_lock() {
            Some(state) => d.field("owner", &state.owner()),
            None => d.field("owner", &format_args!("<locked>")),
        };
        d.field("link", &self.link).finish()
    }
}
