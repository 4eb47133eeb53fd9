// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic task descriptors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum number of periodic tasks per node.
pub const MAX_TASKS: usize = 8;

/// Name used for tasks declared with an empty name.
pub const DEFAULT_TASK_NAME: &str = "statemq_task";

/// Type alias for periodic task callbacks.
pub type TaskCallback = Arc<dyn Fn() + Send + Sync>;

/// Resource budget hint for a periodic task.
///
/// The hint does not imply a dedicated thread. It selects the stack budget
/// the platform would reserve for the task's execution context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceClass {
    /// Light work: state checks, GPIO toggles.
    #[default]
    Small,
    /// Moderate work: formatting, publishing.
    Medium,
    /// Heavy work: parsing, large buffers.
    Large,
}

impl ResourceClass {
    /// Stack budget in bytes for this class.
    #[must_use]
    pub const fn stack_bytes(self) -> usize {
        match self {
            Self::Small => 2048,
            Self::Medium => 4096,
            Self::Large => 8192,
        }
    }
}

/// Identifier of a declared task, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

impl TaskId {
    /// Creates a task id from its index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the declaration index of this task.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of a periodic task.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use statemq::task::{ResourceClass, TaskDef};
///
/// let blink = TaskDef::new("blink", Duration::from_millis(100), || {
///     // drive an LED from the current state
/// })
/// .resource_class(ResourceClass::Small)
/// .enabled(false);
///
/// assert_eq!(blink.name(), "blink");
/// assert!(!blink.is_enabled());
/// ```
#[derive(Clone)]
pub struct TaskDef {
    name: String,
    period: Duration,
    class: ResourceClass,
    callback: TaskCallback,
    enabled: bool,
}

impl TaskDef {
    /// Creates an enabled task with the [`ResourceClass::Small`] budget.
    pub fn new<F>(name: impl Into<String>, period: Duration, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                DEFAULT_TASK_NAME.to_string()
            } else {
                name
            },
            period,
            class: ResourceClass::default(),
            callback: Arc::new(callback),
            enabled: true,
        }
    }

    /// Creates a task whose callback receives a shared context value.
    ///
    /// ```
    /// use std::sync::atomic::{AtomicU32, Ordering};
    /// use std::time::Duration;
    /// use statemq::task::TaskDef;
    ///
    /// let counter = TaskDef::with_context(
    ///     "count",
    ///     Duration::from_secs(1),
    ///     AtomicU32::new(0),
    ///     |n| {
    ///         n.fetch_add(1, Ordering::Relaxed);
    ///     },
    /// );
    /// assert_eq!(counter.name(), "count");
    /// ```
    pub fn with_context<C, F>(
        name: impl Into<String>,
        period: Duration,
        context: C,
        callback: F,
    ) -> Self
    where
        C: Send + Sync + 'static,
        F: Fn(&C) + Send + Sync + 'static,
    {
        Self::new(name, period, move || callback(&context))
    }

    /// Sets the resource budget hint.
    #[must_use]
    pub fn resource_class(mut self, class: ResourceClass) -> Self {
        self.class = class;
        self
    }

    /// Sets whether the task starts enabled (default: true).
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the execution period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns the resource budget hint.
    #[must_use]
    pub fn class(&self) -> ResourceClass {
        self.class
    }

    /// Returns whether the task is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the callback.
    #[must_use]
    pub fn callback(&self) -> &TaskCallback {
        &self.callback
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns an owned snapshot of the descriptor without its callback.
    #[must_use]
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            name: self.name.clone(),
            period: self.period,
            class: self.class,
            enabled: self.enabled,
        }
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name)
            .field("period", &self.period)
            .field("class", &self.class)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a task descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    /// Task name.
    pub name: String,
    /// Execution period.
    pub period: Duration,
    /// Resource budget hint.
    pub class: ResourceClass,
    /// Whether the task is enabled.
    pub enabled: bool,
}

/// Fixed-capacity table of task descriptors.
#[derive(Debug, Clone)]
pub struct TaskTable {
    tasks: Vec<TaskDef>,
    capacity: usize,
}

impl TaskTable {
    /// Creates an empty table with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_TASKS)
    }

    /// Creates an empty table holding at most `capacity` tasks.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a descriptor.
    ///
    /// Returns `None` if the table is full or the period is zero.
    pub fn push(&mut self, task: TaskDef) -> Option<TaskId> {
        if task.period.is_zero() || self.tasks.len() >= self.capacity {
            return None;
        }
        self.tasks.push(task);
        Some(TaskId::new(self.tasks.len() - 1))
    }

    /// Returns the descriptor for `id`.
    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&TaskDef> {
        self.tasks.get(id.index())
    }

    /// Sets the enabled flag of a descriptor. Returns false for unknown ids.
    pub fn set_enabled(&mut self, id: TaskId, enabled: bool) -> bool {
        match self.tasks.get_mut(id.index()) {
            Some(task) => {
                task.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Iterates over descriptors with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &TaskDef)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (TaskId::new(index), task))
    }

    /// Returns the number of declared tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
