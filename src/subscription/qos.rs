// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Delivery-quality levels and per-topic overrides.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of per-topic QoS overrides.
pub const MAX_QOS_OVERRIDES: usize = 16;

/// Message-bus delivery quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery, duplicates possible.
    #[default]
    AtLeastOnce,
    /// Assured single delivery.
    ExactlyOnce,
}

impl Qos {
    /// Converts an integer level, clamping out-of-range values into `0..=2`.
    ///
    /// ```
    /// use statemq::Qos;
    ///
    /// assert_eq!(Qos::clamp(-3), Qos::AtMostOnce);
    /// assert_eq!(Qos::clamp(1), Qos::AtLeastOnce);
    /// assert_eq!(Qos::clamp(9), Qos::ExactlyOnce);
    /// ```
    #[must_use]
    pub const fn clamp(level: i32) -> Self {
        match level {
            i32::MIN..=0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            _ => Self::ExactlyOnce,
        }
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.level())
    }
}

#[cfg(feature = "mqtt")]
impl From<Qos> for rumqttc::QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => Self::AtMostOnce,
            Qos::AtLeastOnce => Self::AtLeastOnce,
            Qos::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

/// Bounded per-topic QoS table. Last writer wins per topic.
#[derive(Debug, Clone)]
pub struct QosOverrides {
    entries: Vec<(String, Qos)>,
    capacity: usize,
}

impl QosOverrides {
    /// Creates an empty table with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_QOS_OVERRIDES)
    }

    /// Creates an empty table holding at most `capacity` topics.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Records the QoS for `topic`.
    ///
    /// Returns false if the topic is new and the table is full; the override
    /// is then dropped.
    pub fn set(&mut self, topic: &str, qos: Qos) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(known, _)| known == topic) {
            entry.1 = qos;
            return true;
        }
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push((topic.to_string(), qos));
        true
    }

    /// Returns the override for `topic`.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Qos> {
        self.entries
            .iter()
            .find(|(known, _)| known == topic)
            .map(|(_, qos)| *qos)
    }

    /// Returns the number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all overrides.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for QosOverrides {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_bounds() {
        assert_eq!(Qos::clamp(i32::MIN), Qos::AtMostOnce);
        assert_eq!(Qos::clamp(0), Qos::AtMostOnce);
        assert_eq!(Qos::clamp(2), Qos::ExactlyOnce);
        assert_eq!(Qos::clamp(i32::MAX), Qos::ExactlyOnce);
    }

    #[test]
    fn default_is_at_least_once() {
        assert_eq!(Qos::default().level(), 1);
    }

    #[test]
    fn last_writer_wins() {
        let mut table = QosOverrides::new();
        table.set("a", Qos::AtMostOnce);
        table.set("a", Qos::ExactlyOnce);
        assert_eq!(table.get("a"), Some(Qos::ExactlyOnce));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn full_table_drops_new_topics_only() {
        let mut table = QosOverrides::with_capacity(1);
        assert!(table.set("a", Qos::AtMostOnce));
        assert!(!table.set("b", Qos::AtMostOnce));
        assert_eq!(table.get("b"), None);
        assert!(table.set("a", Qos::ExactlyOnce));
    }

    #[cfg(feature = "mqtt")]
    #[test]
    fn converts_to_rumqttc() {
        assert_eq!(
            rumqttc::QoS::from(Qos::ExactlyOnce),
            rumqttc::QoS::ExactlyOnce
        );
    }
}
