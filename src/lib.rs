// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `StateMQ` - message-driven state machines for connected nodes.
//!
//! A node subscribes to a message bus, maps exact (topic, payload) pairs to
//! named states, and runs periodic tasks that read the current state. The
//! library keeps the link and the message-bus session alive with
//! exponential backoff, re-subscribes after every reconnect, and can publish
//! a JSON report of each state transition.
//!
//! # Features
//!
//! - **State engine**: append-only state registry, first-match rule table,
//!   reserved `OFFLINE`/`CONNECTED` states, restore of the last user state
//!   on reconnect
//! - **Periodic tasks**: independent cadence per task, enable/disable at
//!   runtime, shared exclusion with message handling
//! - **Subscriptions**: default and per-topic QoS, raw "latest value" slots,
//!   last-will configuration
//! - **Connectivity**: link and session supervision with 2 s to 30 s
//!   backoff, optional state telemetry
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use statemq::task::TaskDef;
//! use statemq::{Node, NodeConfig, Qos};
//!
//! #[tokio::main]
//! async fn main() -> statemq::Result<()> {
//!     let node = Node::mqtt();
//!
//!     let on = node.declare_state_rule("home/lamp/set", "on", "ON");
//!     node.declare_state_rule("home/lamp/set", "off", "OFF");
//!
//!     let lamp = node.downgrade();
//!     node.declare_task(TaskDef::new("lamp", Duration::from_millis(50), move || {
//!         if let Some(lamp) = lamp.upgrade() {
//!             let _lit = lamp.current_state_id() == on;
//!         }
//!     }));
//!
//!     node.subscribe_raw("home/lamp/brightness", Qos::AtMostOnce);
//!     node.enable_state_telemetry("home/lamp/state", None, true);
//!     node.set_last_will("home/lamp/status", "", Qos::AtLeastOnce, true);
//!
//!     node.begin(NodeConfig::new("home", "secret", "mqtt://192.168.1.50:1883"))
//!         .await?;
//!
//!     loop {
//!         if let Some(level) = node.pull_raw("home/lamp/brightness") {
//!             println!("brightness {level}");
//!         }
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!     }
//! }
//! ```
//!
//! # Engine Only
//!
//! The [`StateEngine`] has no runtime requirements and can be driven
//! directly:
//!
//! ```
//! use statemq::{StateEngine, StateId};
//!
//! let engine = StateEngine::new();
//! let hello = engine.declare_state_rule("s", "hi", "HELLO");
//!
//! engine.set_connected(true);
//! assert!(engine.apply_message("s", "hi"));
//! assert_eq!(engine.current_state_id(), hello);
//!
//! engine.set_connected(false);
//! assert_eq!(engine.current_state_id(), StateId::OFFLINE);
//!
//! engine.set_connected(true);
//! assert_eq!(engine.current_state_id(), hello);
//! ```

mod bounded;
pub mod error;
pub mod node;
pub mod protocol;
pub mod state;
pub mod subscription;
pub mod supervisor;
pub mod sync;
pub mod task;

pub use error::{ConfigError, Error, ProtocolError, Result};
pub use node::{Node, NodeConfig, ReconnectPolicy, WeakNode};
pub use protocol::{EventSink, Link, Session};
pub use state::{ChangeCause, StateChange, StateEngine, StateId};
pub use subscription::{LastWill, Qos};
pub use supervisor::{Connectivity, StateReport};
pub use sync::NodeLock;
pub use task::{ResourceClass, TaskDef, TaskId};
