//! Per-direction operation locks.
//!
//! Each direction of a connection (read, write) is owned by at most one
//! operation at a time. An operation that finds its lock held joins a FIFO
//! queue and is handed the lock directly when the holder releases it: the
//! release marks the front waiter as the new owner and wakes its task, which
//! schedules it on the executor rather than running it inline.
//!
//! The lock owns the direction's state, so holding the guard is the only way
//! to reach the buffers behind it. Everything here is single-threaded.

use std::{
    cell::{Cell, RefCell, RefMut},
    collections::VecDeque,
    future::Future,
    ops::{Deref, DerefMut},
    pin::Pin,
    task::{Context, Poll, Waker},
};

use log::trace;

#[derive(Debug)]
struct Waiter {
    id: u64,
    waker: Waker,
}

/// FIFO async lock over `S`.
#[derive(Debug)]
pub(crate) struct OpLock<S> {
    name: &'static str,
    locked: Cell<bool>,
    /// Waiter that was handed the lock and has not yet observed it.
    granted: Cell<Option<u64>>,
    waiters: RefCell<VecDeque<Waiter>>,
    next_id: Cell<u64>,
    data: RefCell<S>,
}

impl<S> OpLock<S> {
    pub(crate) fn new(name: &'static str, data: S) -> Self {
        OpLock {
            name,
            locked: Cell::new(false),
            granted: Cell::new(None),
            waiters: RefCell::new(VecDeque::new()),
            next_id: Cell::new(0),
            data: RefCell::new(data),
        }
    }

    /// Take the lock if it is free and nobody is queued for it.
    pub(crate) fn try_lock(&self) -> Option<OpGuard<'_, S>> {
        if self.locked.get() || !self.waiters.borrow().is_empty() {
            return None;
        }
        self.locked.set(true);
        Some(self.guard())
    }

    /// Wait for the lock in arrival order.
    pub(crate) fn lock(&self) -> Acquire<'_, S> {
        Acquire { lock: self, id: None }
    }

    /// Whether another operation is queued behind the current holder.
    pub(crate) fn has_waiters(&self) -> bool {
        !self.waiters.borrow().is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.get()
    }

    fn guard(&self) -> OpGuard<'_, S> {
        OpGuard { lock: self, data: Some(self.data.borrow_mut()) }
    }

    /// Hand the lock to the front waiter, or mark it free.
    fn unlock(&self) {
        let next = self.waiters.borrow_mut().pop_front();
        match next {
            Some(waiter) => {
                trace!("{} lock handed to waiter {}", self.name, waiter.id);
                self.granted.set(Some(waiter.id));
                waiter.waker.wake();
            }
            None => self.locked.set(false),
        }
    }
}

/// Holds one direction of the connection. Dropping it passes the lock on.
pub(crate) struct OpGuard<'a, S> {
    lock: &'a OpLock<S>,
    data: Option<RefMut<'a, S>>,
}

impl<S> Deref for OpGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `drop` empties `data`.
        self.data.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<S> DerefMut for OpGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.data.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<S> Drop for OpGuard<'_, S> {
    fn drop(&mut self) {
        // The borrow must end before the next owner can take it.
        self.data.take();
        self.lock.unlock();
    }
}

impl<S> std::fmt::Debug for OpGuard<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpGuard").field("lock", &self.lock.name).finish()
    }
}

/// Future returned by [`OpLock::lock`].
#[must_use = "futures do nothing unless polled"]
pub(crate) struct Acquire<'a, S> {
    lock: &'a OpLock<S>,
    id: Option<u64>,
}

impl<'a, S> Future for Acquire<'a, S> {
    type Output = OpGuard<'a, S>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;
        match self.id {
            None => {
                if let Some(guard) = lock.try_lock() {
                    return Poll::Ready(guard);
                }
                let id = lock.next_id.get();
                lock.next_id.set(id.wrapping_add(1));
                trace!("{} lock busy, queued as waiter {id}", lock.name);
                lock.waiters.borrow_mut().push_back(Waiter { id, waker: cx.waker().clone() });
                self.id = Some(id);
                Poll::Pending
            }
            Some(id) => {
                if lock.granted.get() == Some(id) {
                    lock.granted.set(None);
                    self.id = None;
                    return Poll::Ready(lock.guard());
                }
                if let Some(waiter) = lock.waiters.borrow_mut().iter_mut().find(|w| w.id == id) {
                    if !waiter.waker.will_wake(cx.waker()) {
                        waiter.waker = cx.waker().clone();
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<S> Drop for Acquire<'_, S> {
    fn drop(&mut self) {
        let Some(id) = self.id else { return };
        if self.lock.granted.get() == Some(id) {
            // Handed over but never observed: pass it along.
            self.lock.granted.set(None);
            self.lock.unlock();
        } else {
            self.lock.waiters.borrow_mut().retain(|w| w.id != id);
        }
    }
}
