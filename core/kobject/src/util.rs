// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Contract checking helpers shared by the object core.

use std::thread::{self, ThreadId};

/// Reports a broken object contract and terminates the process.
///
/// The message is logged at error level first. Never turn this into a
/// recoverable error: the object state is already suspect when it fires.
macro_rules! violation {
    ($($arg:tt)+) => {{
        let msg = ::std::format!($($arg)+);
        ::log::error!("{}", msg);
        $crate::util::fatal(&msg)
    }};
}

/// Terminates after a contract violation.
///
/// Aborts rather than unwinds, so no `join()` or `catch_unwind` can keep
/// using the object.
#[cfg(not(test))]
#[cold]
pub(crate) fn fatal(_msg: &str) -> ! {
    log::logger().flush();
    std::process::abort()
}

/// Unit tests check the message of a violation with `#[should_panic]`.
#[cfg(test)]
#[cold]
pub(crate) fn fatal(msg: &str) -> ! {
    panic!("{msg}")
}

/// Identity of the calling thread, as recorded in an object's owner field.
#[inline]
pub(crate) fn current_thread() -> ThreadId {
    thread::current().id()
}
