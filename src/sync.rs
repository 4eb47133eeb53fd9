// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The node-wide exclusion discipline.
//!
//! A single [`NodeLock`] serializes every execution context of a node: the
//! periodic task runners, the connectivity supervisor loop and application
//! calls. It is re-entrant, so a context that already holds it (for example a
//! task callback) may call back into engine operations that acquire it again.
//!
//! Component data lives behind `parking_lot::Mutex` leaf locks. A leaf lock
//! is never held while entering the node lock or while running a callback.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Guard returned by [`NodeLock::enter`].
pub type NodeGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// Shared, re-entrant exclusion lock for one node.
///
/// Cloning is cheap and yields a handle to the same lock.
#[derive(Clone)]
pub struct NodeLock {
    inner: Arc<ReentrantMutex<()>>,
}

impl NodeLock {
    /// Creates a new, unlocked node lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Acquires the lock, blocking until it is available.
    ///
    /// Re-entering from the thread that already holds it succeeds immediately.
    pub fn enter(&self) -> NodeGuard<'_> {
        self.inner.lock()
    }

    /// Attempts to acquire the lock, waiting at most `timeout`.
    ///
    /// Returns `None` if another context held the lock for the whole wait.
    pub fn try_enter_for(&self, timeout: Duration) -> Option<NodeGuard<'_>> {
        self.inner.try_lock_for(timeout)
    }

    /// Returns true if both handles refer to the same lock.
    #[must_use]
    pub fn same_as(&self, other: &NodeLock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for NodeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reentrant_on_same_thread() {
        let lock = NodeLock::new();
        let _outer = lock.enter();
        let inner = lock.try_enter_for(Duration::from_millis(1));
        assert!(inner.is_some());
    }

    #[test]
    fn bounded_wait_times_out_across_threads() {
        let lock = NodeLock::new();
        let _held = lock.enter();

        let other = lock.clone();
        let acquired = std::thread::spawn(move || {
            other.try_enter_for(Duration::from_millis(10)).is_some()
        })
        .join()
        .unwrap();

        assert!(!acquired);
    }

    #[test]
    fn clone_shares_lock() {
        let a = NodeLock::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&NodeLock::new()));
    }
}
