// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic task execution.
//!
//! Every task runs in its own tokio task driven by an independent
//! [`tokio::time::interval`]. Before each callback the runner tries to enter
//! the [`NodeLock`] for a bounded time; if another context holds the lock for
//! the whole wait, the tick is skipped and the cadence continues.
//!
//! Enablement is carried by a `watch` channel per task. A disabled runner
//! parks on the channel instead of ticking and restarts its cadence when it
//! is enabled again.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::sync::NodeLock;

use super::{TaskCallback, TaskDef, TaskId};

/// Default bounded wait for the node lock before a tick.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(20);

struct TaskHandle {
    id: TaskId,
    enabled: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Live execution contexts for a set of task descriptors.
///
/// Dropping the scheduler aborts all runners.
pub struct Scheduler {
    handles: Vec<TaskHandle>,
}

impl Scheduler {
    /// Spawns one runner per descriptor on the current tokio runtime.
    ///
    /// Each runner starts in the descriptor's enabled state.
    pub fn spawn<I>(tasks: I, lock: &NodeLock, acquire_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = (TaskId, TaskDef)>,
    {
        let handles = tasks
            .into_iter()
            .map(|(id, task)| {
                let (enabled, gate) = watch::channel(task.is_enabled());
                tracing::debug!(
                    task = %task.name(),
                    id = %id,
                    period_ms = task.period().as_millis(),
                    stack_bytes = task.class().stack_bytes(),
                    "Starting task"
                );
                let runner = TaskRunner {
                    name: task.name().to_string(),
                    period: task.period(),
                    callback: task.callback().clone(),
                    lock: lock.clone(),
                    acquire_timeout,
                };
                TaskHandle {
                    id,
                    enabled,
                    join: tokio::spawn(runner.run(gate)),
                }
            })
            .collect();

        Self { handles }
    }

    /// Suspends or resumes a running task.
    ///
    /// Returns false for ids this scheduler does not run.
    pub fn set_enabled(&self, id: TaskId, enabled: bool) -> bool {
        match self.handles.iter().find(|handle| handle.id == id) {
            Some(handle) => {
                handle.enabled.send_replace(enabled);
                true
            }
            None => false,
        }
    }

    /// Returns the number of running tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if no task is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stops every runner and waits until they have exited.
    pub async fn shutdown(mut self) {
        let handles = std::mem::take(&mut self.handles);
        for handle in &handles {
            handle.join.abort();
        }
        for handle in handles {
            // Cancellation is the expected outcome.
            let _ = handle.join.await;
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.join.abort();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.handles.len())
            .finish()
    }
}

struct TaskRunner {
    name: String,
    period: Duration,
    callback: TaskCallback,
    lock: NodeLock,
    acquire_timeout: Duration,
}

impl TaskRunner {
    async fn run(self, mut gate: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if !*gate.borrow_and_update() {
                if gate.wait_for(|enabled| *enabled).await.is_err() {
                    break;
                }
                interval.reset_immediately();
            }

            tokio::select! {
                _ = interval.tick() => {
                    // Re-check after waking; a disable may have raced the tick.
                    if *gate.borrow() {
                        self.tick();
                    }
                }
                changed = gate.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::trace!(task = %self.name, "Task runner exited");
    }

    fn tick(&self) -> bool {
        run_tick(&self.lock, self.acquire_timeout, &self.callback, &self.name)
    }
}

/// Runs one tick of a task under the node lock.
///
/// Returns false if the lock could not be acquired in time.
pub(crate) fn run_tick(
    lock: &NodeLock,
    acquire_timeout: Duration,
    callback: &TaskCallback,
    name: &str,
) -> bool {
    let Some(_guard) = lock.try_enter_for(acquire_timeout) else {
        tracing::trace!(task = %name, "Node busy, skipping tick");
        return false;
    };
    callback();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(name: &str, period_ms: u64) -> (TaskDef, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let task = TaskDef::new(name, Duration::from_millis(period_ms), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (task, hits)
    }

    #[test]
    fn tick_skips_when_lock_is_held_elsewhere() {
        let lock = NodeLock::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let callback: TaskCallback = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder_lock = lock.clone();
        let holder = std::thread::spawn(move || {
            let _guard = holder_lock.enter();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        held_rx.recv().unwrap();

        assert!(!run_tick(&lock, Duration::from_millis(5), &callback, "t"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        assert!(run_tick(&lock, Duration::from_millis(5), &callback, "t"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tick_reenters_lock_held_by_same_thread() {
        let lock = NodeLock::new();
        let callback: TaskCallback = Arc::new(|| {});
        let _guard = lock.enter();
        assert!(run_tick(&lock, Duration::from_millis(1), &callback, "t"));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_at_period() {
        let (task, hits) = counting("fast", 10);
        let scheduler = Scheduler::spawn(
            [(TaskId::new(0), task)],
            &NodeLock::new(),
            DEFAULT_ACQUIRE_TIMEOUT,
        );

        tokio::time::sleep(Duration::from_millis(35)).await;
        // Ticks at 0, 10, 20 and 30 ms.
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.len(), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_keep_independent_cadence() {
        let (fast, fast_hits) = counting("fast", 10);
        let (slow, slow_hits) = counting("slow", 25);
        let scheduler = Scheduler::spawn(
            [(TaskId::new(0), fast), (TaskId::new(1), slow)],
            &NodeLock::new(),
            DEFAULT_ACQUIRE_TIMEOUT,
        );

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(fast_hits.load(Ordering::SeqCst), 6);
        assert_eq!(slow_hits.load(Ordering::SeqCst), 3);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_task_does_not_run_until_enabled() {
        let (task, hits) = counting("gated", 10);
        let scheduler = Scheduler::spawn(
            [(TaskId::new(0), task.enabled(false))],
            &NodeLock::new(),
            DEFAULT_ACQUIRE_TIMEOUT,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        assert!(scheduler.set_enabled(TaskId::new(0), true));
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        assert!(scheduler.set_enabled(TaskId::new(0), false));
        tokio::time::sleep(Duration::from_millis(1)).await;
        let frozen = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), frozen);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_are_rejected() {
        let (task, _) = counting("one", 10);
        let scheduler = Scheduler::spawn(
            [(TaskId::new(0), task)],
            &NodeLock::new(),
            DEFAULT_ACQUIRE_TIMEOUT,
        );
        assert!(!scheduler.set_enabled(TaskId::new(5), false));
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_execution() {
        let (task, hits) = counting("stop", 10);
        let scheduler = Scheduler::spawn(
            [(TaskId::new(0), task)],
            &NodeLock::new(),
            DEFAULT_ACQUIRE_TIMEOUT,
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.shutdown().await;

        let after = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), after);
    }
}
