// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State-change telemetry.

use serde::Serialize;

use crate::state::{StateChange, StateId};
use crate::subscription::Qos;

/// Telemetry payload published on every state change.
///
/// Serializes as `{"prev":"<name>","curr":"<name>","uptime_ms":<n>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReport {
    /// Name of the previously published state.
    pub prev: String,
    /// Name of the state just entered.
    pub curr: String,
    /// Milliseconds since the node started.
    pub uptime_ms: u64,
}

/// Where and how state reports are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TelemetryTarget {
    pub topic: String,
    pub qos: Option<Qos>,
    pub retain: bool,
}

/// A report ready to be resolved to names and published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingReport {
    pub target: TelemetryTarget,
    pub prev: StateId,
    pub curr: StateId,
}

/// Tracks the published prev/curr chain.
#[derive(Debug, Default)]
pub(crate) struct StatePublisher {
    target: Option<TelemetryTarget>,
    last_published: Option<StateId>,
}

impl StatePublisher {
    /// Enables publishing to `topic`. An empty topic disables instead.
    ///
    /// Restarts the chain so the next report bootstraps from the engine.
    pub(crate) fn enable(&mut self, topic: &str, qos: Option<Qos>, retain: bool) -> bool {
        self.last_published = None;
        if topic.is_empty() {
            self.target = None;
            return false;
        }
        self.target = Some(TelemetryTarget {
            topic: topic.to_string(),
            qos,
            retain,
        });
        true
    }

    pub(crate) fn disable(&mut self) {
        self.target = None;
        self.last_published = None;
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Advances the chain for a change that will be published.
    ///
    /// The previous state is the last published one, or the engine's
    /// previous state for the first report.
    pub(crate) fn advance(&mut self, change: &StateChange) -> Option<PendingReport> {
        let target = self.target.clone()?;
        let prev = self.last_published.unwrap_or(change.previous);
        self.last_published = Some(change.current);
        Some(PendingReport {
            target,
            prev,
            curr: change.current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChangeCause;

    fn change(previous: StateId, current: StateId) -> StateChange {
        StateChange {
            previous,
            requested: current,
            current,
            cause: ChangeCause::RuleMatch,
            rule_index: None,
            topic: None,
            payload: None,
        }
    }

    #[test]
    fn report_json_shape() {
        let report = StateReport {
            prev: "OFFLINE".to_string(),
            curr: "RUN".to_string(),
            uptime_ms: 42,
        };
        assert_eq!(
            serde_json::to_string(&report).unwrap(),
            r#"{"prev":"OFFLINE","curr":"RUN","uptime_ms":42}"#
        );
    }

    #[test]
    fn disabled_publisher_yields_nothing() {
        let mut publisher = StatePublisher::default();
        assert!(publisher.advance(&change(StateId::OFFLINE, StateId::CONNECTED)).is_none());
    }

    #[test]
    fn chain_uses_last_published_state() {
        let a = StateId::from_raw(2);
        let b = StateId::from_raw(3);
        let mut publisher = StatePublisher::default();
        publisher.enable("tele/state", None, false);

        let first = publisher.advance(&change(StateId::OFFLINE, a)).unwrap();
        assert_eq!((first.prev, first.curr), (StateId::OFFLINE, a));

        // A change the publisher never saw does not break the chain.
        let second = publisher.advance(&change(StateId::CONNECTED, b)).unwrap();
        assert_eq!((second.prev, second.curr), (a, b));
    }

    #[test]
    fn re_enabling_restarts_chain() {
        let a = StateId::from_raw(2);
        let mut publisher = StatePublisher::default();
        publisher.enable("t", Some(Qos::AtMostOnce), true);
        publisher.advance(&change(StateId::OFFLINE, a));

        publisher.enable("t", None, false);
        let report = publisher.advance(&change(StateId::CONNECTED, a)).unwrap();
        assert_eq!(report.prev, StateId::CONNECTED);
    }

    #[test]
    fn empty_topic_disables() {
        let mut publisher = StatePublisher::default();
        publisher.enable("t", None, false);
        assert!(!publisher.enable("", None, false));
        assert!(!publisher.is_enabled());
    }
}
