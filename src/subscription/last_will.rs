// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Last-will configuration.

use serde::{Deserialize, Serialize};

use super::Qos;

/// Payload used when a last will is configured with an empty payload.
pub const DEFAULT_WILL_PAYLOAD: &str = "offline";

/// Message the broker publishes on the node's behalf after an unclean
/// disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastWill {
    /// Topic of the will message.
    pub topic: String,
    /// Payload of the will message.
    pub payload: String,
    /// Delivery quality.
    pub qos: Qos,
    /// Whether the broker retains the will message.
    pub retain: bool,
}

impl LastWill {
    /// Creates a last will.
    ///
    /// An empty payload is replaced by [`DEFAULT_WILL_PAYLOAD`].
    ///
    /// ```
    /// use statemq::{LastWill, Qos};
    ///
    /// let will = LastWill::new("lab/node/status", "", Qos::AtLeastOnce, true);
    /// assert_eq!(will.payload, "offline");
    /// ```
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<String>,
        qos: Qos,
        retain: bool,
    ) -> Self {
        let payload = payload.into();
        Self {
            topic: topic.into(),
            payload: if payload.is_empty() {
                DEFAULT_WILL_PAYLOAD.to_string()
            } else {
                payload
            },
            qos,
            retain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_explicit_payload() {
        let will = LastWill::new("t", "gone", Qos::ExactlyOnce, false);
        assert_eq!(will.payload, "gone");
        assert_eq!(will.qos, Qos::ExactlyOnce);
        assert!(!will.retain);
    }
}
