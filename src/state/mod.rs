// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node state management.
//!
//! A node is always in exactly one state. Two states are reserved:
//! `OFFLINE` while the message-bus session is down and `CONNECTED` as the
//! neutral state while it is up. Applications declare further states through
//! rules that map an exact (topic, payload) pair to a state name.
//!
//! The [`StateEngine`] owns the tables and applies the transition rules,
//! reporting each effective transition as a [`StateChange`].
//!
//! # Examples
//!
//! ```
//! use statemq::state::{StateEngine, StateId};
//!
//! let engine = StateEngine::new();
//! let idle = engine.declare_state_rule("lab/cmd", "idle", "IDLE");
//! assert!(idle.is_user());
//!
//! engine.set_connected(true);
//! engine.apply_message("lab/cmd", "idle");
//! assert_eq!(engine.current_state_name(), "IDLE");
//!
//! engine.set_connected(false);
//! assert_eq!(engine.current_state_id(), StateId::OFFLINE);
//! ```

mod engine;
mod registry;
mod rule;
mod state_change;
mod state_id;

pub use engine::{EngineLimits, StateEngine, StateObserver};
pub use registry::{MAX_STATE_NAME_LEN, MAX_STATES, StateRegistry};
pub use rule::{MAX_RULES, Rule, RuleTable};
pub use state_change::{ChangeCause, StateChange};
pub use state_id::{CONNECTED_STATE, OFFLINE_STATE, StateId};
