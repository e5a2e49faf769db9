mod common;

use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use kobject::{BaseObject, Dispatch, Magic};

use self::common::assert_fatal;

struct QueueIcd;

impl Dispatch for QueueIcd {}

static ICD: QueueIcd = QueueIcd;

const QUEUE: Magic = Magic::new(0x2d5e_8b10_c7f4_93a6);
const EVENT: Magic = Magic::new(0x61c0_ee29_4b87_0d3f);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn may_interrupt() {
    // simulate preemption
    if fastrand::u8(0..3) == 0 {
        thread::yield_now();
    }
}

#[test]
fn ownership_basic() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    assert!(obj.take_ownership(false));
    assert!(obj.is_owned_by_current());
    assert_eq!(obj.owner(), Some(thread::current().id()));

    obj.release_ownership();
    assert_eq!(obj.owner(), None);
    assert!(!obj.is_owned_by_current());
}

#[test]
fn ownership_reentry() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    assert!(obj.take_ownership(false));
    assert!(obj.take_ownership(false));
    assert!(obj.take_ownership(true));
    assert!(obj.is_owned_by_current());

    // Not depth counted: one release clears everything.
    obj.release_ownership();
    assert_eq!(obj.owner(), None);
}

#[test]
fn ownership_try_busy() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    assert!(obj.take_ownership(false));
    let owner = obj.owner();

    thread::scope(|s| {
        s.spawn(|| {
            assert!(!obj.take_ownership(false));
            assert!(obj.try_own().is_none());
        });
    });

    assert_eq!(obj.owner(), owner);
    obj.release_ownership();
}

#[test]
fn ownership_race_try() {
    init_logger();

    const NUM_THREADS: usize = 8;

    for _ in 0..100 {
        let obj = BaseObject::new(QUEUE, &ICD);
        let winners = AtomicUsize::new(0);
        let barrier = Barrier::new(NUM_THREADS);

        thread::scope(|s| {
            for _ in 0..NUM_THREADS {
                s.spawn(|| {
                    barrier.wait();
                    if obj.take_ownership(false) {
                        winners.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::Relaxed), 1);
        assert!(obj.owner().is_some());
    }
}

#[test]
fn ownership_blocking_waits_for_release() {
    init_logger();

    let obj = Arc::new(BaseObject::new(QUEUE, &ICD));
    let acquired = Arc::new(AtomicBool::new(false));
    assert!(obj.take_ownership(false));

    let waiter = {
        let obj = obj.clone();
        let acquired = acquired.clone();
        thread::spawn(move || {
            assert!(obj.take_ownership(true));
            acquired.store(true, Ordering::Release);
            assert!(obj.is_owned_by_current());
            obj.release_ownership();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::Acquire));
    assert!(obj.is_owned_by_current());

    obj.release_ownership();
    waiter.join().unwrap();
    assert!(acquired.load(Ordering::Acquire));
    assert_eq!(obj.owner(), None);
}

#[test]
fn ownership_mutual_exclusion() {
    init_logger();

    const NUM_THREADS: u32 = 8;
    const NUM_ITERS: u32 = 2000;

    let obj = BaseObject::new(QUEUE, &ICD);
    let inside = AtomicU32::new(0);
    let total = AtomicU32::new(0);

    thread::scope(|s| {
        for i in 0..NUM_THREADS {
            let (obj, inside, total) = (&obj, &inside, &total);
            s.spawn(move || {
                for _ in 0..NUM_ITERS {
                    if i % 2 == 0 {
                        assert!(obj.take_ownership(true));
                    } else {
                        while !obj.take_ownership(false) {
                            may_interrupt();
                        }
                    }
                    assert_eq!(inside.fetch_add(1, Ordering::AcqRel), 0);
                    total.fetch_add(1, Ordering::Relaxed);
                    may_interrupt();
                    assert_eq!(inside.fetch_sub(1, Ordering::AcqRel), 1);
                    obj.release_ownership();
                    may_interrupt();
                }
            });
        }
    });

    assert_eq!(total.load(Ordering::Relaxed), NUM_THREADS * NUM_ITERS);
    assert_eq!(obj.owner(), None);
}

#[test]
fn ownership_guard() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    {
        let owned = obj.own();
        assert!(owned.is_owned_by_current());
        assert!(owned.has_magic(QUEUE));
    }
    assert_eq!(obj.owner(), None);

    let owned = obj.try_own();
    assert!(owned.is_some());
    drop(owned);
    assert_eq!(obj.owner(), None);
}

#[test]
fn ownership_with_held_lock() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    let mut lock = obj.lock();
    assert!(lock.take_ownership(false));
    assert_eq!(lock.owner(), Some(thread::current().id()));
    assert!(std::ptr::eq(lock.object(), &obj));
    lock.release_ownership();
    drop(lock);

    assert_eq!(obj.owner(), None);
}

#[test]
fn ownership_blocking_with_held_lock() {
    init_logger();

    let obj = Arc::new(BaseObject::new(QUEUE, &ICD));
    let (tx, rx) = std::sync::mpsc::channel();

    let owner = {
        let obj = obj.clone();
        thread::spawn(move || {
            assert!(obj.take_ownership(false));
            tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(30));
            obj.release_ownership();
        })
    };

    rx.recv().unwrap();
    // The lock is given up while blocked, otherwise the owner could never
    // release.
    let mut lock = obj.lock();
    assert!(lock.take_ownership(true));
    lock.release_ownership();
    drop(lock);
    owner.join().unwrap();
}

#[test]
fn wait_and_notify() {
    init_logger();

    const RUNNING: i32 = 1;
    const COMPLETE: i32 = 0;

    let event = Arc::new(BaseObject::new(EVENT, &ICD));
    let status = Arc::new(AtomicI32::new(RUNNING));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let event = event.clone();
            let status = status.clone();
            thread::spawn(move || {
                let mut lock = event.lock();
                while status.load(Ordering::Acquire) != COMPLETE {
                    lock.wait();
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    {
        let lock = event.lock();
        status.store(COMPLETE, Ordering::Release);
        lock.notify();
    }

    for waiter in waiters {
        waiter.join().unwrap();
    }
}

#[test]
fn release_wakes_condition_waiters() {
    init_logger();

    let event = Arc::new(BaseObject::new(EVENT, &ICD));
    let done = Arc::new(AtomicBool::new(false));
    assert!(event.take_ownership(false));

    let waiter = {
        let event = event.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut lock = event.lock();
            while !done.load(Ordering::Acquire) {
                lock.wait();
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    {
        // Flip the flag under the lock, then let release broadcast.
        let _lock = event.lock();
        done.store(true, Ordering::Release);
    }
    event.release_ownership();
    waiter.join().unwrap();
}

#[test]
fn release_foreign_ownership() {
    assert_fatal(
        "release_foreign_ownership",
        &["tried to release ownership held by"],
        || {
            init_logger();

            let obj = BaseObject::new(QUEUE, &ICD);
            thread::scope(|s| {
                s.spawn(|| assert!(obj.take_ownership(false)));
            });
            obj.release_ownership();
        },
    );
}

#[test]
fn nested_ownership_guards() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    let outer = obj.own();
    {
        let _inner = obj.own();
        assert!(obj.is_owned_by_current());
    }
    assert!(obj.is_owned_by_current());
    {
        let _inner = obj.try_own().unwrap();
    }
    assert!(obj.is_owned_by_current());

    drop(outer);
    assert_eq!(obj.owner(), None);
}

#[test]
#[cfg(feature = "stats")]
fn ownership_stats() {
    init_logger();

    let obj = BaseObject::new(QUEUE, &ICD);
    obj.reset_stats();

    assert!(obj.take_ownership(false));
    assert!(obj.take_ownership(false));
    thread::scope(|s| {
        s.spawn(|| assert!(!obj.take_ownership(false)));
    });

    let (claims, busy, blocks) = obj.stats();
    assert_eq!(claims, 1);
    assert_eq!(busy, 1);
    assert_eq!(blocks, 0);
    obj.release_ownership();
}
