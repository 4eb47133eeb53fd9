// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Application-facing node.
//!
//! A [`Node`] ties the state engine, the periodic tasks and the
//! connectivity supervisor together. Applications declare rules and tasks,
//! call [`Node::begin`], and then react to state changes.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use statemq::protocol::{HostLink, MqttSession};
//! use statemq::task::TaskDef;
//! use statemq::{Node, NodeConfig, Qos};
//!
//! #[tokio::main]
//! async fn main() -> statemq::Result<()> {
//!     let node = Node::new(Arc::new(HostLink::new()), Arc::new(MqttSession::new()));
//!
//!     let running = node.declare_state_rule("lab/pump/cmd", "start", "RUNNING");
//!     node.declare_state_rule("lab/pump/cmd", "stop", "IDLE");
//!
//!     let watcher = node.downgrade();
//!     node.declare_task(TaskDef::new("pump", Duration::from_millis(100), move || {
//!         let Some(node) = watcher.upgrade() else { return };
//!         if node.current_state_id() == running {
//!             // drive the pump
//!         }
//!     }));
//!
//!     node.enable_state_telemetry("lab/pump/state", Some(Qos::AtLeastOnce), true);
//!     node.on_state_change(|change| println!("{} -> {}", change.previous, change.current));
//!
//!     node.begin(NodeConfig::new("lab-net", "secret", "mqtt://192.168.1.50:1883"))
//!         .await?;
//!
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     node.end(false).await;
//!     Ok(())
//! }
//! ```

mod config;

pub use config::{DEFAULT_KEEP_ALIVE, DEFAULT_TICK_INTERVAL, NodeConfig, ReconnectPolicy};

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::error::Result;
use crate::protocol::{Link, Session};
use crate::state::{EngineLimits, Rule, StateChange, StateEngine, StateId};
use crate::subscription::{LastWill, Qos};
use crate::supervisor::{Connectivity, Supervisor};
use crate::sync::NodeLock;
use crate::task::{TaskDef, TaskId, TaskInfo};

use config::keep_alive_from_secs;

/// A state-machine node driven by message-bus traffic.
///
/// Cloning is cheap; clones share the same node. Tasks and observers are
/// owned by the node, so a closure that captures a `Node` keeps it alive
/// forever. Capture a [`WeakNode`] from [`downgrade`](Node::downgrade)
/// instead.
#[derive(Clone)]
pub struct Node {
    supervisor: Arc<Supervisor>,
}

/// A handle that does not keep its [`Node`] alive.
#[derive(Debug, Clone)]
pub struct WeakNode {
    supervisor: Weak<Supervisor>,
}

impl WeakNode {
    /// Returns the node if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.supervisor.upgrade().map(|supervisor| Node { supervisor })
    }
}

impl Node {
    /// Creates a node over the given link and session collaborators.
    #[must_use]
    pub fn new(link: Arc<dyn Link>, session: Arc<dyn Session>) -> Self {
        Self::with_limits(EngineLimits::default(), link, session)
    }

    /// Creates a node with custom table capacities.
    #[must_use]
    pub fn with_limits(
        limits: EngineLimits,
        link: Arc<dyn Link>,
        session: Arc<dyn Session>,
    ) -> Self {
        let engine = Arc::new(StateEngine::with_limits(NodeLock::new(), limits));
        Self {
            supervisor: Supervisor::new(engine, link, session),
        }
    }

    /// Creates a node on a [`HostLink`](crate::protocol::HostLink) with an
    /// [`MqttSession`](crate::protocol::MqttSession).
    #[cfg(feature = "mqtt")]
    #[must_use]
    pub fn mqtt() -> Self {
        Self::new(
            Arc::new(crate::protocol::HostLink::new()),
            Arc::new(crate::protocol::MqttSession::new()),
        )
    }

    /// Returns a handle that does not keep the node alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            supervisor: Arc::downgrade(&self.supervisor),
        }
    }

    /// Returns the node's state engine.
    ///
    /// The engine's observer slot is used by the node; register observers
    /// through [`on_state_change`](Self::on_state_change) instead.
    #[must_use]
    pub fn engine(&self) -> &StateEngine {
        self.supervisor.engine()
    }

    /// Returns the lock shared by the engine, message handling and tasks.
    ///
    /// Application code may hold it to perform several operations
    /// atomically with respect to inbound messages and task ticks.
    #[must_use]
    pub fn lock(&self) -> &NodeLock {
        self.engine().lock()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the node: connects the link, starts the session supervisor and
    /// spawns every declared task.
    ///
    /// A running node is stopped first; its configuration tables are kept.
    /// Connectivity failures are retried in the background and never
    /// reported here.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub async fn begin(&self, config: NodeConfig) -> Result<()> {
        config.validate()?;
        self.supervisor.start(&config).await;
        Ok(())
    }

    /// Stops the node.
    ///
    /// Tasks stop first, then the supervisor loop, then the session and
    /// (if `disconnect_link` is set) the link. QoS overrides, raw
    /// subscriptions, the last will and telemetry are cleared; rules and
    /// tasks stay declared. The engine ends in OFFLINE.
    pub async fn end(&self, disconnect_link: bool) {
        self.supervisor.stop(disconnect_link).await;
        self.supervisor.clear_configuration();
        self.engine().set_connected(false);
    }

    /// Returns true between [`begin`](Self::begin) and [`end`](Self::end).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    // =========================================================================
    // Rules and tasks
    // =========================================================================

    /// Declares that `payload` on `topic` moves the node to `state_name`.
    ///
    /// See [`StateEngine::declare_state_rule`].
    pub fn declare_state_rule(&self, topic: &str, payload: &str, state_name: &str) -> StateId {
        self.engine().declare_state_rule(topic, payload, state_name)
    }

    /// Declares a periodic task.
    ///
    /// Returns `None` if the task table is full, the period is zero, or the
    /// node is running. A task that needs the node should capture a
    /// [`WeakNode`].
    pub fn declare_task(&self, task: TaskDef) -> Option<TaskId> {
        if self.is_running() {
            tracing::debug!(task = %task.name(), "Rejecting task declared while running");
            return None;
        }
        self.engine().declare_task(task)
    }

    /// Suspends or resumes a task without losing its descriptor.
    ///
    /// Returns false for unknown ids.
    pub fn enable_task(&self, id: TaskId, enabled: bool) -> bool {
        self.supervisor.set_task_enabled(id, enabled)
    }

    /// Returns whether a task is enabled. False for unknown ids.
    #[must_use]
    pub fn task_enabled(&self, id: TaskId) -> bool {
        self.engine().task_enabled(id)
    }

    /// Returns the number of declared tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.engine().task_count()
    }

    /// Returns a snapshot of a task descriptor.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<TaskInfo> {
        self.engine().task(id)
    }

    /// Returns the number of declared rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.engine().rule_count()
    }

    /// Returns a snapshot of the rule at `index`.
    #[must_use]
    pub fn rule(&self, index: usize) -> Option<Rule> {
        self.engine().rule(index)
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Subscribes to `topic` and keeps its latest payload for
    /// [`pull_raw`](Self::pull_raw).
    ///
    /// Records `qos` as the topic's override. Subscribes immediately when a
    /// session is up, and again on every session establishment.
    ///
    /// Returns false for an empty topic or when all raw slots are taken.
    pub fn subscribe_raw(&self, topic: &str, qos: Qos) -> bool {
        self.supervisor.subscribe_raw(topic, qos)
    }

    /// Takes the payload received on `topic` since the last pull.
    #[must_use]
    pub fn pull_raw(&self, topic: &str) -> Option<String> {
        self.supervisor.pull_raw(topic)
    }

    /// Publishes a message.
    ///
    /// `None` QoS uses the default publish QoS. Returns false for an empty
    /// topic, when no session is up, or when the session refuses the
    /// request.
    pub fn publish(
        &self,
        topic: &str,
        payload: impl AsRef<[u8]>,
        qos: Option<Qos>,
        retain: bool,
    ) -> bool {
        self.supervisor.publish(topic, payload.as_ref(), qos, retain)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Sets the QoS for subscriptions without an override.
    pub fn set_default_subscribe_qos(&self, qos: Qos) {
        self.supervisor.set_default_subscribe_qos(qos);
    }

    /// Sets the QoS for publishes that do not name one.
    pub fn set_default_publish_qos(&self, qos: Qos) {
        self.supervisor.set_default_publish_qos(qos);
    }

    /// Overrides the subscription QoS of one topic.
    ///
    /// Returns false for an empty topic or when the override table is full.
    pub fn set_qos_for_topic(&self, topic: &str, qos: Qos) -> bool {
        self.supervisor.set_qos_for_topic(topic, qos)
    }

    /// Returns the subscription QoS for `topic`.
    #[must_use]
    pub fn qos_for_topic(&self, topic: &str) -> Qos {
        self.supervisor.resolve_qos(topic)
    }

    /// Sets the session keep-alive. Zero selects the 30 s default.
    ///
    /// Applies from the next session attempt.
    pub fn set_keep_alive_seconds(&self, secs: u16) {
        self.supervisor.set_keep_alive(keep_alive_from_secs(secs));
    }

    /// Registers a last will, applied from the next session attempt.
    ///
    /// An empty payload is replaced by `"offline"`. Returns false for an
    /// empty topic.
    pub fn set_last_will(&self, topic: &str, payload: &str, qos: Qos, retain: bool) -> bool {
        if topic.is_empty() {
            return false;
        }
        self.supervisor
            .set_last_will(Some(LastWill::new(topic, payload, qos, retain)));
        true
    }

    /// Removes the last will from the next session attempt on.
    pub fn clear_last_will(&self) {
        self.supervisor.set_last_will(None);
    }

    /// Returns the registered last will.
    #[must_use]
    pub fn last_will(&self) -> Option<LastWill> {
        self.supervisor.last_will()
    }

    /// Publishes a [`StateReport`](crate::supervisor::StateReport) on
    /// `topic` after every transition while the session is up.
    ///
    /// `None` QoS uses the default publish QoS. An empty topic disables
    /// telemetry and returns false.
    pub fn enable_state_telemetry(&self, topic: &str, qos: Option<Qos>, retain: bool) -> bool {
        self.supervisor.enable_state_telemetry(topic, qos, retain)
    }

    /// Stops state telemetry.
    pub fn disable_state_telemetry(&self) {
        self.supervisor.disable_state_telemetry();
    }

    /// Returns true if state telemetry is enabled.
    #[must_use]
    pub fn state_telemetry_enabled(&self) -> bool {
        self.supervisor.state_telemetry_enabled()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Returns the current state id.
    #[must_use]
    pub fn current_state_id(&self) -> StateId {
        self.engine().current_state_id()
    }

    /// Returns the current state name.
    #[must_use]
    pub fn current_state_name(&self) -> String {
        self.engine().current_state_name()
    }

    /// Returns the name of any state id.
    #[must_use]
    pub fn state_name(&self, id: StateId) -> String {
        self.engine().state_name(id)
    }

    /// Returns true while the message-bus session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connectivity() == Connectivity::SessionUp
    }

    /// Returns the connectivity phase.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        self.supervisor.connectivity()
    }

    /// Returns the interval the next session retry waits.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        self.supervisor.reconnect_interval()
    }

    /// Registers the state-change observer, replacing any previous one.
    ///
    /// The observer runs on the thread that caused the transition, after
    /// state telemetry. The engine's state lock is already released. For
    /// message-driven transitions the node lock is still held, so the
    /// observer may re-enter the node on that thread but must not wait on
    /// another thread that needs the lock.
    pub fn on_state_change<F>(&self, observer: F)
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.supervisor.set_observer(Some(Arc::new(observer)));
    }

    /// Removes the state-change observer.
    pub fn clear_state_observer(&self) {
        self.supervisor.set_observer(None);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("state", &self.current_state_name())
            .field("connectivity", &self.connectivity())
            .finish_non_exhaustive()
    }
}
