// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Base object core of the GPU compute runtime.
//!
//! Every resource object (queues, buffers, events, kernels, ...) embeds a
//! [`BaseObject`], which provides:
//!
//! - Lifetime tracking: a reference count and a validity [`Magic`] that turns
//!   use-after-destroy into a detected contract violation
//! - [`IntrusiveLink`]: membership in at most one parent collection
//! - Ownership: exclusive, per-thread right to mutate the object, taken with
//!   [`BaseObject::take_ownership`] or scoped with [`BaseObject::own`]
//! - [`take_multi_ownership`]: deadlock free ownership of a set of objects
//! - [`ObjectLock`]: the object's mutex, with a condition variable for
//!   higher layers waiting on other state changes
//!
//! Contract violations (destroying a referenced, owned or linked object, using
//! a dead one, releasing another thread's ownership) are logged and then abort
//! the process. They are bugs in the caller and are never reported as errors.
//!
//! # Examples
//!
//! ## Single object
//! ```no_run
//! use kobject::{BaseObject, Dispatch, Magic};
//!
//! struct Icd;
//! impl Dispatch for Icd {}
//! static ICD: Icd = Icd;
//!
//! const BUFFER: Magic = Magic::new(0x4ff0_2bd8_3e15_c8a1);
//!
//! let buffer = BaseObject::new(BUFFER, &ICD);
//! {
//!     let _owned = buffer.own();
//!     // exclusive mutation of the buffer
//! }
//! buffer.refs().fetch_sub(1, core::sync::atomic::Ordering::AcqRel);
//! buffer.destroy();
//! ```
//!
//! ## Several objects
//! ```no_run
//! use kobject::{BaseObject, Dispatch, Magic, own_all};
//!
//! struct Icd;
//! impl Dispatch for Icd {}
//! static ICD: Icd = Icd;
//!
//! const BUFFER: Magic = Magic::new(0x4ff0_2bd8_3e15_c8a1);
//! const EVENT: Magic = Magic::new(0x8a36_71c5_0e9f_d224);
//!
//! let src = BaseObject::new(BUFFER, &ICD);
//! let dst = BaseObject::new(BUFFER, &ICD);
//! let event = BaseObject::new(EVENT, &ICD);
//!
//! let owned = own_all(&[&src, &dst, &event]);
//! assert_eq!(owned.objects().len(), 3);
//! ```
//!
//! ## Waiting for a state change
//! ```no_run
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! use kobject::BaseObject;
//!
//! fn wait_complete(event: &BaseObject, complete: &AtomicBool) {
//!     let mut lock = event.lock();
//!     while !complete.load(Ordering::Acquire) {
//!         lock.wait();
//!     }
//! }
//!
//! fn set_complete(event: &BaseObject, complete: &AtomicBool) {
//!     let lock = event.lock();
//!     complete.store(true, Ordering::Release);
//!     lock.notify();
//! }
//! ```
//!
//! # Features
//!
//! - `stats`: Enable ownership statistics tracking (claims, busy attempts,
//!   blocks)

#[macro_use]
mod util;

mod link;
mod multi;
mod object;
mod owner;

#[cfg(feature = "stats")]
pub use self::owner::OwnershipStats;
pub use self::{
    link::{IntrusiveLink, ParentId},
    multi::{MultiOwnership, own_all, take_multi_ownership, try_own_all},
    object::{BaseObject, Dispatch, Magic},
    owner::{ObjectLock, Ownership},
};
