//! FIFO mailbox lock
//!
//! A ticket lock around the transport: each caller draws a ticket and is
//! admitted strictly in draw order, so at most one mailbox transaction is in
//! flight per device and waiters are served first-come first-served.

use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tickets {
    next: u64,
    serving: u64,
}

/// Owns a value and hands out exclusive, FIFO-ordered access to it
#[derive(Debug)]
pub struct MailboxLock<T> {
    inner: Mutex<T>,
    tickets: Mutex<Tickets>,
    turn: Condvar,
}

impl<T> MailboxLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            tickets: Mutex::new(Tickets::default()),
            turn: Condvar::new(),
        }
    }

    /// Block until every earlier caller has released, then take the value
    pub fn acquire(&self) -> MailboxGuard<'_, T> {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        let ticket = tickets.next;
        tickets.next += 1;
        while tickets.serving != ticket {
            tickets = self
                .turn
                .wait(tickets)
                .unwrap_or_else(PoisonError::into_inner);
        }
        drop(tickets);

        let value = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        MailboxGuard {
            lock: self,
            value: Some(value),
        }
    }

    /// Number of callers holding or waiting for the lock
    pub fn queued(&self) -> u64 {
        let tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        tickets.next - tickets.serving
    }

    /// Consume the lock and return the value
    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut tickets = self.tickets.lock().unwrap_or_else(PoisonError::into_inner);
        tickets.serving += 1;
        self.turn.notify_all();
    }
}

/// Exclusive access to the locked value; the next ticket is admitted on drop
pub struct MailboxGuard<'a, T> {
    lock: &'a MailboxLock<T>,
    value: Option<MutexGuard<'a, T>>,
}

impl<T> Deref for MailboxGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the guard out.
        self.value.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for MailboxGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for MailboxGuard<'_, T> {
    fn drop(&mut self) {
        self.value.take();
        self.lock.release();
    }
}
