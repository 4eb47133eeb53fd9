// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic tasks.
//!
//! Task descriptors ([`TaskDef`]) are declared on the node before it starts
//! and stored in the engine's [`TaskTable`]. Starting the node spawns one
//! runner per descriptor through the [`Scheduler`]; afterwards tasks can only
//! be enabled or disabled, never added or removed.

mod scheduler;
mod task_def;

pub use scheduler::{DEFAULT_ACQUIRE_TIMEOUT, Scheduler};
pub use task_def::{
    DEFAULT_TASK_NAME, MAX_TASKS, ResourceClass, TaskCallback, TaskDef, TaskId, TaskInfo,
    TaskTable,
};
