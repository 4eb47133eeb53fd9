// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pull-style capture slots for raw subscriptions.

use crate::bounded::truncate_str;

/// Maximum number of raw subscriptions.
pub const MAX_RAW_SUBSCRIPTIONS: usize = 16;

/// Maximum stored topic length in bytes.
pub const RAW_TOPIC_LEN: usize = 63;

/// Maximum stored payload length in bytes.
pub const RAW_PAYLOAD_LEN: usize = 127;

#[derive(Debug, Clone)]
struct RawSlot {
    topic: String,
    payload: String,
    fresh: bool,
}

/// Single-consumer, last-value-wins payload slots keyed by topic.
///
/// ```
/// use statemq::subscription::RawSlots;
///
/// let mut slots = RawSlots::new();
/// slots.register("lab/temp");
/// slots.store("lab/temp", "20.5");
/// slots.store("lab/temp", "21.0");
///
/// assert_eq!(slots.take("lab/temp").as_deref(), Some("21.0"));
/// assert_eq!(slots.take("lab/temp"), None);
/// ```
#[derive(Debug, Clone)]
pub struct RawSlots {
    slots: Vec<RawSlot>,
    capacity: usize,
}

impl RawSlots {
    /// Creates an empty set of slots with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_RAW_SUBSCRIPTIONS)
    }

    /// Creates an empty set holding at most `capacity` topics.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn find_mut(&mut self, topic: &str) -> Option<&mut RawSlot> {
        let topic = truncate_str(topic, RAW_TOPIC_LEN);
        self.slots.iter_mut().find(|slot| slot.topic == topic)
    }

    /// Returns true if a slot exists for `topic`.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        let topic = truncate_str(topic, RAW_TOPIC_LEN);
        self.slots.iter().any(|slot| slot.topic == topic)
    }

    /// Ensures a slot exists for `topic`.
    ///
    /// Returns false for an empty topic or when a new slot is needed and all
    /// slots are taken.
    pub fn register(&mut self, topic: &str) -> bool {
        if topic.is_empty() {
            return false;
        }
        if self.contains(topic) {
            return true;
        }
        if self.slots.len() >= self.capacity {
            return false;
        }
        self.slots.push(RawSlot {
            topic: truncate_str(topic, RAW_TOPIC_LEN).to_string(),
            payload: String::new(),
            fresh: false,
        });
        true
    }

    /// Stores a payload into the slot for `topic`, marking it new.
    ///
    /// Returns false if no slot exists for the topic.
    pub fn store(&mut self, topic: &str, payload: &str) -> bool {
        let Some(slot) = self.find_mut(topic) else {
            return false;
        };
        slot.payload.clear();
        slot.payload.push_str(truncate_str(payload, RAW_PAYLOAD_LEN));
        slot.fresh = true;
        true
    }

    /// Returns the latest payload if it has not been taken yet.
    pub fn take(&mut self, topic: &str) -> Option<String> {
        let slot = self.find_mut(topic)?;
        if !slot.fresh {
            return None;
        }
        slot.fresh = false;
        Some(slot.payload.clone())
    }

    /// Iterates over registered topics in registration order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.topic.as_str())
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Removes all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl Default for RawSlots {
    fn default() -> Self {
        Self::new()
    }
}
