// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The state engine.
//!
//! The [`StateEngine`] owns the state registry, the rule table, the task
//! descriptors and the transition state of a node. Inbound messages and
//! connectivity facts are fed in through [`apply_message`] and
//! [`set_connected`]; the engine decides which state is entered and notifies
//! a single observer.
//!
//! # Transition rules
//!
//! 1. While disconnected the entered state is always `OFFLINE`, whatever was
//!    requested. A transition to `OFFLINE` while already `OFFLINE` is a no-op.
//! 2. While connected, a requested user state that is not registered is
//!    coerced to `CONNECTED`.
//! 3. Rule matches and reconnect restores that enter a user state record it
//!    as the last user state, which the next reconnect restores.
//! 4. Entering the current state again is a no-op and fires nothing.
//! 5. Otherwise the state is updated and the observer fires exactly once,
//!    after the engine's locks have been released.
//!
//! [`apply_message`]: StateEngine::apply_message
//! [`set_connected`]: StateEngine::set_connected

use std::sync::Arc;

use parking_lot::Mutex;

use crate::sync::NodeLock;
use crate::task::{TaskDef, TaskId, TaskInfo, TaskTable};

use super::registry::{MAX_STATES, StateRegistry};
use super::rule::{MAX_RULES, Rule, RuleTable};
use super::state_change::{ChangeCause, RuleOrigin, StateChange};
use super::state_id::{CONNECTED_STATE, OFFLINE_STATE, StateId};

/// Type alias for state change observers.
pub type StateObserver = Arc<dyn Fn(&StateChange) + Send + Sync>;

/// Table capacities of a [`StateEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Maximum number of user-declared states.
    pub max_states: usize,
    /// Maximum number of rules.
    pub max_rules: usize,
    /// Maximum number of periodic tasks.
    pub max_tasks: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_states: MAX_STATES,
            max_rules: MAX_RULES,
            max_tasks: crate::task::MAX_TASKS,
        }
    }
}

struct EngineState {
    registry: StateRegistry,
    rules: RuleTable,
    tasks: TaskTable,
    current: StateId,
    last_user: StateId,
    connected: bool,
    observer: Option<StateObserver>,
}

/// Message-driven state engine.
///
/// All operations are safe to call from any thread. They serialize on the
/// engine's [`NodeLock`], which may be shared with other node components.
///
/// # Examples
///
/// ```
/// use statemq::{StateEngine, StateId};
///
/// let engine = StateEngine::new();
/// let running = engine.declare_state_rule("lab/node/in", "run", "RUNNING");
///
/// engine.set_connected(true);
/// assert_eq!(engine.current_state_id(), StateId::CONNECTED);
///
/// assert!(engine.apply_message("lab/node/in", "run"));
/// assert_eq!(engine.current_state_name(), "RUNNING");
///
/// // Reconnecting restores the last user state.
/// engine.set_connected(false);
/// engine.set_connected(true);
/// assert_eq!(engine.current_state_id(), running);
/// ```
pub struct StateEngine {
    lock: NodeLock,
    state: Mutex<EngineState>,
}

impl StateEngine {
    /// Creates an engine with its own lock and default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock(NodeLock::new())
    }

    /// Creates an engine that serializes on an existing node lock.
    #[must_use]
    pub fn with_lock(lock: NodeLock) -> Self {
        Self::with_limits(lock, EngineLimits::default())
    }

    /// Creates an engine with explicit table capacities.
    #[must_use]
    pub fn with_limits(lock: NodeLock, limits: EngineLimits) -> Self {
        Self {
            lock,
            state: Mutex::new(EngineState {
                registry: StateRegistry::with_capacity(limits.max_states),
                rules: RuleTable::with_capacity(limits.max_rules),
                tasks: TaskTable::with_capacity(limits.max_tasks),
                current: StateId::OFFLINE,
                last_user: StateId::CONNECTED,
                connected: false,
                observer: None,
            }),
        }
    }

    /// Returns the lock this engine serializes on.
    #[must_use]
    pub fn lock(&self) -> &NodeLock {
        &self.lock
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let _guard = self.lock.enter();
        let mut state = self.state.lock();
        f(&mut state)
    }

    // =========================================================================
    // Declaration
    // =========================================================================

    /// Declares that `payload` on `topic` puts the node in state `state_name`.
    ///
    /// Returns the identity of the state. Reserved names (`OFFLINE`,
    /// `CONNECTED`) return their fixed identities and store nothing.
    ///
    /// Returns [`StateId::CONNECTED`] without storing anything when the topic
    /// or state name is empty, the rule table is full, or the state registry
    /// is full and the name is new.
    pub fn declare_state_rule(&self, topic: &str, payload: &str, state_name: &str) -> StateId {
        if topic.is_empty() || state_name.is_empty() {
            tracing::debug!(topic = %topic, state = %state_name, "Rejected rule with empty field");
            return StateId::CONNECTED;
        }

        self.with_state(|state| {
            if state.rules.is_full() {
                tracing::debug!(topic = %topic, state = %state_name, "Rule table full");
                return StateId::CONNECTED;
            }
            if let Some(id) = StateId::reserved(state_name) {
                return id;
            }
            let Some(id) = state.registry.intern(state_name) else {
                tracing::debug!(state = %state_name, "State registry full");
                return StateId::CONNECTED;
            };

            state.rules.push(Rule::new(topic, payload, id));
            tracing::debug!(
                topic = %topic,
                payload = %payload,
                state = %state_name,
                id = %id,
                "Declared rule"
            );
            id
        })
    }

    /// Declares a periodic task.
    ///
    /// Returns `None` if the task table is full or the period is zero.
    pub fn declare_task(&self, task: TaskDef) -> Option<TaskId> {
        let name = task.name().to_string();
        let id = self.with_state(|state| state.tasks.push(task));
        match id {
            Some(id) => tracing::debug!(task = %name, id = %id, "Declared task"),
            None => tracing::debug!(task = %name, "Rejected task declaration"),
        }
        id
    }

    /// Sets the enabled flag of a task descriptor.
    ///
    /// Returns false for unknown ids.
    pub fn set_task_enabled(&self, id: TaskId, enabled: bool) -> bool {
        self.with_state(|state| state.tasks.set_enabled(id, enabled))
    }

    /// Returns whether a task is enabled. Unknown ids report false.
    #[must_use]
    pub fn task_enabled(&self, id: TaskId) -> bool {
        self.with_state(|state| state.tasks.get(id).is_some_and(TaskDef::is_enabled))
    }

    /// Returns the number of declared tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.with_state(|state| state.tasks.len())
    }

    /// Returns a snapshot of a task descriptor.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.with_state(|state| state.tasks.get(id).map(TaskDef::info))
    }

    /// Returns clones of all task descriptors, for spawning.
    pub(crate) fn task_defs(&self) -> Vec<(TaskId, TaskDef)> {
        self.with_state(|state| {
            state
                .tasks
                .iter()
                .map(|(id, task)| (id, task.clone()))
                .collect()
        })
    }

    // =========================================================================
    // Inputs
    // =========================================================================

    /// Feeds an inbound message through the rule table.
    ///
    /// Returns true if a rule matched, whether or not the state changed.
    pub fn apply_message(&self, topic: &str, payload: &str) -> bool {
        let outcome = self.with_state(|state| {
            let (index, target) = state
                .rules
                .find(topic, payload)
                .map(|(index, rule)| (index, rule.target()))?;

            let origin = RuleOrigin {
                index,
                topic,
                payload,
            };
            Some(Self::transition(
                state,
                target,
                true,
                ChangeCause::RuleMatch,
                Some(origin),
            ))
        });

        match outcome {
            Some(fired) => {
                Self::notify(fired);
                true
            }
            None => false,
        }
    }

    /// Informs the engine of session connectivity.
    ///
    /// Connecting restores the last user state if there is one, `CONNECTED`
    /// otherwise. Disconnecting always enters `OFFLINE`.
    pub fn set_connected(&self, connected: bool) {
        let fired = self.with_state(|state| {
            state.connected = connected;
            let (target, cause) = if connected {
                let target = if state.last_user.is_user() {
                    state.last_user
                } else {
                    StateId::CONNECTED
                };
                (target, ChangeCause::Connected)
            } else {
                (StateId::OFFLINE, ChangeCause::Disconnected)
            };
            Self::transition(state, target, connected, cause, None)
        });
        Self::notify(fired);
    }

    /// Applies the transition rules. Returns the change to notify, if any.
    fn transition(
        state: &mut EngineState,
        requested: StateId,
        user_state: bool,
        cause: ChangeCause,
        origin: Option<RuleOrigin<'_>>,
    ) -> Option<(StateChange, StateObserver)> {
        let previous = state.current;

        let applied = if state.connected {
            let applied = if requested.is_user() && !state.registry.contains(requested) {
                StateId::CONNECTED
            } else {
                requested
            };
            if user_state && applied.is_user() {
                state.last_user = applied;
            }
            applied
        } else {
            StateId::OFFLINE
        };

        if applied == previous {
            return None;
        }
        state.current = applied;

        tracing::debug!(
            prev = %previous,
            requested = %requested,
            curr = %applied,
            cause = ?cause,
            "State transition"
        );

        let observer = state.observer.clone()?;
        let change = StateChange {
            previous,
            requested,
            current: applied,
            cause,
            rule_index: origin.map(|o| o.index),
            topic: origin.map(|o| o.topic.to_string()),
            payload: origin.map(|o| o.payload.to_string()),
        };
        Some((change, observer))
    }

    fn notify(fired: Option<(StateChange, StateObserver)>) {
        if let Some((change, observer)) = fired {
            observer(&change);
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Installs the state change observer, replacing any previous one.
    ///
    /// The observer runs on the thread that caused the transition, after the
    /// engine state has been updated, and may query the engine freely.
    pub fn on_state_change<F>(&self, observer: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.set_observer(Some(Arc::new(observer)));
    }

    /// Replaces the observer slot.
    pub fn set_observer(&self, observer: Option<StateObserver>) {
        self.with_state(|state| state.observer = observer);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the current state identity.
    #[must_use]
    pub fn current_state_id(&self) -> StateId {
        self.with_state(|state| {
            if !state.connected {
                StateId::OFFLINE
            } else if state.current.is_user() {
                state.current
            } else {
                StateId::CONNECTED
            }
        })
    }

    /// Returns the current state name. Never empty.
    #[must_use]
    pub fn current_state_name(&self) -> String {
        let _guard = self.lock.enter();
        self.state_name(self.current_state_id())
    }

    /// Returns the name of any state identity.
    ///
    /// Unknown identities resolve to `CONNECTED`.
    #[must_use]
    pub fn state_name(&self, id: StateId) -> String {
        match id {
            StateId::OFFLINE => OFFLINE_STATE.to_string(),
            StateId::CONNECTED => CONNECTED_STATE.to_string(),
            id => self.with_state(|state| {
                state
                    .registry
                    .name(id)
                    .unwrap_or(CONNECTED_STATE)
                    .to_string()
            }),
        }
    }

    /// Looks up the identity of a declared or reserved state name.
    #[must_use]
    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.with_state(|state| state.registry.lookup(name))
    }

    /// Returns whether the engine considers the node connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.with_state(|state| state.connected)
    }

    /// Returns the user state a reconnect would restore, if any.
    #[must_use]
    pub fn last_user_state(&self) -> Option<StateId> {
        self.with_state(|state| state.last_user.is_user().then_some(state.last_user))
    }

    /// Returns the number of declared user states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.with_state(|state| state.registry.len())
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.with_state(|state| state.rules.len())
    }

    /// Returns a copy of the rule at `index`.
    #[must_use]
    pub fn rule(&self, index: usize) -> Option<Rule> {
        self.with_state(|state| state.rules.get(index).cloned())
    }

    /// Returns rule topics in declaration order, duplicates included.
    #[must_use]
    pub fn rule_topics(&self) -> Vec<String> {
        self.with_state(|state| state.rules.topics().map(str::to_string).collect())
    }
}

impl Default for StateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_state(|state| {
            f.debug_struct("StateEngine")
                .field("current", &state.current)
                .field("connected", &state.connected)
                .field("states", &state.registry.len())
                .field("rules", &state.rules.len())
                .field("tasks", &state.tasks.len())
                .finish_non_exhaustive()
        })
    }
}
