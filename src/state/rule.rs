// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered (topic, payload) → state rules.

use serde::Serialize;

use super::StateId;

/// Maximum number of rules in a rule table.
pub const MAX_RULES: usize = 32;

/// Maps an exact (topic, payload) pair to a target state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    topic: String,
    payload: String,
    target: StateId,
}

impl Rule {
    /// Creates a new rule.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, target: StateId) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            target,
        }
    }

    /// Topic this rule matches.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Payload this rule matches.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// State entered when this rule matches.
    #[must_use]
    pub fn target(&self) -> StateId {
        self.target
    }

    /// Returns true if the rule matches the given message exactly.
    #[must_use]
    pub fn matches(&self, topic: &str, payload: &str) -> bool {
        self.topic == topic && self.payload == payload
    }
}

/// Fixed-capacity, declaration-ordered rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
    capacity: usize,
}

impl RuleTable {
    /// Creates an empty table with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_RULES)
    }

    /// Creates an empty table holding at most `capacity` rules.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rules: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns true if no more rules can be added.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.rules.len() >= self.capacity
    }

    /// Appends a rule. Returns false if the table is full.
    pub fn push(&mut self, rule: Rule) -> bool {
        if self.is_full() {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Finds the first rule matching the message, with its index.
    #[must_use]
    pub fn find(&self, topic: &str, payload: &str) -> Option<(usize, &Rule)> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matches(topic, payload))
    }

    /// Returns the rule at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    /// Iterates over rule topics in declaration order, duplicates included.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(Rule::topic)
    }

    /// Returns the number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::new()
    }
}
