// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! All-or-nothing ownership of a set of objects.
//!
//! Enqueuing a command touches several objects at once (a queue, its buffers,
//! an event). Taking their ownership one by one deadlocks as soon as two
//! threads request overlapping sets in different orders. Instead, every pass
//! only tries to take each object without blocking. On the first busy object
//! every object of the set the thread owns is released, even one it owned
//! before the call, and the thread blocks on the busy object alone before
//! starting over. A thread never blocks while holding any object of the set,
//! so no global ordering of objects is needed.
//!
//! Nothing bounds the number of passes; contention sets in the runtime are
//! small and short lived.

use core::{marker::PhantomData, ptr};

use crate::{BaseObject, owner::Claim};

/// Ownership bookkeeping of one call, released on every exit path.
struct Claims<'o, 'a> {
    objects: &'o [&'a BaseObject],
    owned: Vec<bool>,
}

impl<'o, 'a> Claims<'o, 'a> {
    fn new(objects: &'o [&'a BaseObject]) -> Self {
        Self {
            objects,
            owned: vec![false; objects.len()],
        }
    }

    /// Tries every object in order and returns the index of the first busy
    /// one.
    ///
    /// Objects the calling thread held before the call are recorded like
    /// freshly claimed ones, so a rollback gives them up as well.
    fn try_all(&mut self) -> Option<usize> {
        for (i, obj) in self.objects.iter().enumerate() {
            match obj.lock().claim(false) {
                Claim::Claimed | Claim::Held => self.owned[i] = true,
                Claim::Busy => return Some(i),
            }
        }
        None
    }

    /// Blocks until the object at `index` is owned.
    fn wait_for(&mut self, index: usize) {
        self.objects[index].lock().claim(true);
        self.owned[index] = true;
    }

    /// Releases everything owned in the set.
    fn release(&mut self) {
        for (obj, owned) in self.objects.iter().zip(self.owned.iter_mut()) {
            if core::mem::take(owned) {
                obj.release_ownership();
            }
        }
    }

    /// Hands the owned objects over to the caller.
    fn keep(mut self) {
        self.owned.fill(false);
    }
}

impl Drop for Claims<'_, '_> {
    fn drop(&mut self) {
        self.release();
    }
}

fn all_distinct(objects: &[&BaseObject]) -> bool {
    objects
        .iter()
        .enumerate()
        .all(|(i, a)| objects[..i].iter().all(|b| !ptr::eq(*a, *b)))
}

/// Takes ownership of all `objects` for the calling thread, or of none.
///
/// Returns `true` once every object is owned. If `wait` is `false`, returns
/// `false` as soon as one of them is owned by another thread, in which case
/// none of the objects is owned by the calling thread, including those it
/// owned before the call.
///
/// Objects the calling thread already owns are given up whenever the call
/// backs off, so the caller never blocks while holding part of the set. The
/// objects must be distinct and live.
pub fn take_multi_ownership(objects: &[&BaseObject], wait: bool) -> bool {
    debug_assert!(
        all_distinct(objects),
        "the same object is requested twice"
    );

    let mut claims = Claims::new(objects);
    loop {
        let Some(busy) = claims.try_all() else {
            claims.keep();
            return true;
        };

        claims.release();
        if !wait {
            return false;
        }

        log::debug!(
            "multi-ownership of {} objects: waiting for {:p} before retrying",
            objects.len(),
            objects[busy]
        );
        claims.wait_for(busy);
    }
}

/// Takes ownership of the set and returns, per object, whether the caller
/// acquired it rather than owning it already.
fn acquire(objects: &[&BaseObject], wait: bool) -> Option<Vec<bool>> {
    let fresh: Vec<bool> = objects
        .iter()
        .map(|obj| !obj.is_owned_by_current())
        .collect();
    take_multi_ownership(objects, wait).then_some(fresh)
}

/// Takes ownership of all `objects`, blocking as long as needed, and returns
/// a guard that releases them on drop.
pub fn own_all<'a>(objects: &[&'a BaseObject]) -> MultiOwnership<'a> {
    let fresh = acquire(objects, true).unwrap_or_default();
    MultiOwnership::new(objects, fresh)
}

/// Takes ownership of all `objects` if none of them is owned by another
/// thread.
///
/// On failure nothing in the set is owned, see [`take_multi_ownership`].
pub fn try_own_all<'a>(objects: &[&'a BaseObject]) -> Option<MultiOwnership<'a>> {
    acquire(objects, false).map(|fresh| MultiOwnership::new(objects, fresh))
}

/// RAII guard for the ownership of a set of objects.
///
/// Dropping it releases, in reverse order, every object of the set that the
/// calling thread did not already own when the guard was created.
#[must_use = "ownership is released as soon as the guard is dropped"]
pub struct MultiOwnership<'a> {
    objects: Vec<&'a BaseObject>,
    fresh: Vec<bool>,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MultiOwnership<'a> {
    fn new(objects: &[&'a BaseObject], fresh: Vec<bool>) -> Self {
        Self {
            objects: objects.to_vec(),
            fresh,
            _not_send: PhantomData,
        }
    }

    /// Returns the owned objects, in request order.
    pub fn objects(&self) -> &[&'a BaseObject] {
        &self.objects
    }
}

impl Drop for MultiOwnership<'_> {
    fn drop(&mut self) {
        for (obj, fresh) in self.objects.iter().zip(&self.fresh).rev() {
            if *fresh {
                obj.release_ownership();
            }
        }
    }
}
