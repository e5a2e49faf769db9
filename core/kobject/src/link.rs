// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Intrusive membership marker.
//!
//! An object can be a member of at most one parent collection (a context's
//! queue list, a queue's event list, ...). The collection itself lives outside
//! this crate; it attaches a member on insertion and detaches it on removal.
//! [`BaseObject::destroy`](crate::BaseObject::destroy) refuses to run on an
//! object that is still attached.

use core::{
    fmt,
    num::NonZeroUsize,
    ptr::NonNull,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Opaque identity of a parent collection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParentId(NonZeroUsize);

impl ParentId {
    /// Creates an identity from a raw non-zero value.
    pub const fn new(raw: NonZeroUsize) -> Self {
        Self(raw)
    }

    /// Identifies a parent collection by its address.
    ///
    /// The parent must not be zero-sized: every zero-sized value may share the
    /// same dangling address. Give such collections an identity with
    /// [`ParentId::new`] instead.
    pub fn of<T: ?Sized>(parent: &T) -> Self {
        Self(NonNull::from(parent).cast::<u8>().addr())
    }

    /// Returns the raw identity value.
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParentId({:#x})", self.0)
    }
}

/// Membership state of an object in at most one parent collection.
///
/// A zero word means detached.
pub struct IntrusiveLink {
    parent: AtomicUsize,
}

impl IntrusiveLink {
    /// Creates a detached link.
    pub const fn new() -> Self {
        Self {
            parent: AtomicUsize::new(0),
        }
    }

    /// Marks the link as a member of `parent`.
    ///
    /// Attaching a link that already belongs to a collection, including
    /// `parent` itself, is a fatal contract violation.
    pub fn attach(&self, parent: ParentId) {
        if let Err(old) =
            self.parent
                .compare_exchange(0, parent.get(), Ordering::AcqRel, Ordering::Acquire)
        {
            violation!(
                "link {:p}: attach to {:?} while still a member of {:#x}",
                self,
                parent,
                old
            );
        }
        log::trace!("link {:p}: attached to {:?}", self, parent);
    }

    /// Marks the link as detached and returns the collection it belonged to.
    ///
    /// Detaching a link that is not attached is a no-op returning `None`.
    pub fn detach(&self) -> Option<ParentId> {
        let old = NonZeroUsize::new(self.parent.swap(0, Ordering::AcqRel)).map(ParentId);
        if let Some(parent) = old {
            log::trace!("link {:p}: detached from {:?}", self, parent);
        }
        old
    }

    /// Returns the collection this link belongs to, if any.
    pub fn parent(&self) -> Option<ParentId> {
        NonZeroUsize::new(self.parent.load(Ordering::Acquire)).map(ParentId)
    }

    /// Returns `true` if the link belongs to a collection.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.parent.load(Ordering::Acquire) != 0
    }
}

impl Default for IntrusiveLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IntrusiveLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent() {
            Some(parent) => f.debug_tuple("Attached").field(&parent).finish(),
            None => f.write_str("Detached"),
        }
    }
}
