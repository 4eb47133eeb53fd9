// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscriptions, delivery quality and last will.
//!
//! The [`SubscriptionResolver`] decides what a node subscribes to when its
//! session comes up: every distinct rule topic in declaration order, then
//! every raw subscription not already covered. Each topic is subscribed at
//! its per-topic override or the default subscribe QoS.
//!
//! Raw subscriptions capture payloads for pull-style consumption
//! independently of rule matching. Each topic keeps only its newest payload.

mod last_will;
mod qos;
mod raw;
mod resolver;

pub use last_will::{DEFAULT_WILL_PAYLOAD, LastWill};
pub use qos::{MAX_QOS_OVERRIDES, Qos, QosOverrides};
pub use raw::{MAX_RAW_SUBSCRIPTIONS, RAW_PAYLOAD_LEN, RAW_TOPIC_LEN, RawSlots};
pub use resolver::SubscriptionResolver;
