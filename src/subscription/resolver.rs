// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topic subscription and QoS resolution.

use std::collections::HashSet;

use super::{Qos, QosOverrides, RawSlots};

/// Resolves which topics to subscribe, at which QoS, and captures raw
/// subscription payloads.
///
/// # Examples
///
/// ```
/// use statemq::Qos;
/// use statemq::subscription::SubscriptionResolver;
///
/// let mut resolver = SubscriptionResolver::new();
/// resolver.subscribe_raw("lab/temp", Qos::AtMostOnce);
///
/// let plan = resolver.subscription_plan(["lab/cmd", "lab/cmd", "lab/temp"]);
/// assert_eq!(
///     plan,
///     vec![
///         ("lab/cmd".to_string(), Qos::AtLeastOnce),
///         ("lab/temp".to_string(), Qos::AtMostOnce),
///     ]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct SubscriptionResolver {
    default_qos: Qos,
    overrides: QosOverrides,
    raw: RawSlots,
}

impl SubscriptionResolver {
    /// Creates a resolver with the default subscribe QoS.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the QoS used for topics without an override.
    pub fn set_default_qos(&mut self, qos: Qos) {
        self.default_qos = qos;
    }

    /// Returns the QoS used for topics without an override.
    #[must_use]
    pub fn default_qos(&self) -> Qos {
        self.default_qos
    }

    /// Records a per-topic QoS override.
    ///
    /// Returns false for an empty topic or when the override table is full.
    pub fn set_qos_for_topic(&mut self, topic: &str, qos: Qos) -> bool {
        !topic.is_empty() && self.overrides.set(topic, qos)
    }

    /// Returns the override for `topic`, or the default subscribe QoS.
    #[must_use]
    pub fn resolve_qos(&self, topic: &str) -> Qos {
        self.overrides.get(topic).unwrap_or(self.default_qos)
    }

    /// Registers a raw subscription and records its QoS.
    ///
    /// Returns false for an empty topic or when all raw slots are taken.
    /// A full override table does not fail the call; the topic then uses the
    /// default QoS.
    pub fn subscribe_raw(&mut self, topic: &str, qos: Qos) -> bool {
        if !self.raw.register(topic) {
            tracing::debug!(topic = %topic, "Raw subscription rejected");
            return false;
        }
        if !self.overrides.set(topic, qos) {
            tracing::debug!(topic = %topic, "QoS override table full");
        }
        true
    }

    /// Takes the newest unread payload for a raw subscription.
    pub fn pull_raw(&mut self, topic: &str) -> Option<String> {
        self.raw.take(topic)
    }

    /// Captures an inbound payload into the matching raw slot, if any.
    pub fn capture(&mut self, topic: &str, payload: &str) -> bool {
        self.raw.store(topic, payload)
    }

    /// Returns the raw slots.
    #[must_use]
    pub fn raw(&self) -> &RawSlots {
        &self.raw
    }

    /// Builds the ordered subscription list for a fresh session.
    ///
    /// Rule topics come first in the given order, each topic once; then raw
    /// topics not already covered, in registration order.
    pub fn subscription_plan<'a, I>(&'a self, rule_topics: I) -> Vec<(String, Qos)>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        rule_topics
            .into_iter()
            .chain(self.raw.topics())
            .filter(|topic| !topic.is_empty() && seen.insert(*topic))
            .map(|topic| (topic.to_string(), self.resolve_qos(topic)))
            .collect()
    }

    /// Clears overrides and raw slots. The default QoS is kept.
    pub fn clear(&mut self) {
        self.overrides.clear();
        self.raw.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_take_precedence() {
        let mut resolver = SubscriptionResolver::new();
        resolver.set_default_qos(Qos::AtMostOnce);
        resolver.set_qos_for_topic("t", Qos::ExactlyOnce);

        assert_eq!(resolver.resolve_qos("t"), Qos::ExactlyOnce);
        assert_eq!(resolver.resolve_qos("u"), Qos::AtMostOnce);
    }

    #[test]
    fn empty_topic_override_is_rejected() {
        let mut resolver = SubscriptionResolver::new();
        assert!(!resolver.set_qos_for_topic("", Qos::ExactlyOnce));
    }

    #[test]
    fn raw_subscription_updates_qos() {
        let mut resolver = SubscriptionResolver::new();
        resolver.subscribe_raw("t", Qos::AtMostOnce);
        resolver.subscribe_raw("t", Qos::ExactlyOnce);
        assert_eq!(resolver.resolve_qos("t"), Qos::ExactlyOnce);
        assert_eq!(resolver.raw().len(), 1);
    }

    #[test]
    fn plan_puts_rules_first_without_duplicates() {
        let mut resolver = SubscriptionResolver::new();
        resolver.subscribe_raw("raw/b", Qos::AtMostOnce);
        resolver.subscribe_raw("rule/a", Qos::ExactlyOnce);
        resolver.subscribe_raw("raw/c", Qos::AtMostOnce);

        let topics: Vec<_> = resolver
            .subscription_plan(["rule/a", "rule/z", "rule/a"])
            .into_iter()
            .map(|(topic, _)| topic)
            .collect();
        assert_eq!(topics, vec!["rule/a", "rule/z", "raw/b", "raw/c"]);
    }

    #[test]
    fn plan_accepts_borrowed_rule_topics() {
        let mut resolver = SubscriptionResolver::new();
        resolver.set_qos_for_topic("rule/1", Qos::ExactlyOnce);
        resolver.subscribe_raw("raw/x", Qos::AtMostOnce);

        let rule_topics: Vec<String> = (0..3).map(|i| format!("rule/{i}")).collect();
        let plan = resolver.subscription_plan(rule_topics.iter().map(String::as_str));
        drop(rule_topics);

        assert_eq!(
            plan,
            vec![
                ("rule/0".to_string(), Qos::AtLeastOnce),
                ("rule/1".to_string(), Qos::ExactlyOnce),
                ("rule/2".to_string(), Qos::AtLeastOnce),
                ("raw/x".to_string(), Qos::AtMostOnce),
            ]
        );
    }

    #[test]
    fn capture_and_pull() {
        let mut resolver = SubscriptionResolver::new();
        resolver.subscribe_raw("t", Qos::AtLeastOnce);
        assert!(resolver.capture("t", "1"));
        assert!(resolver.capture("t", "2"));
        assert!(!resolver.capture("other", "x"));

        assert_eq!(resolver.pull_raw("t").as_deref(), Some("2"));
        assert_eq!(resolver.pull_raw("t"), None);
    }

    #[test]
    fn clear_keeps_default_qos() {
        let mut resolver = SubscriptionResolver::new();
        resolver.set_default_qos(Qos::ExactlyOnce);
        resolver.subscribe_raw("t", Qos::AtMostOnce);
        resolver.clear();

        assert!(resolver.raw().is_empty());
        assert_eq!(resolver.resolve_qos("t"), Qos::ExactlyOnce);
    }
}
