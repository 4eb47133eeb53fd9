// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Append-only registry of user-declared state names.

use crate::bounded::truncate_str;

use super::StateId;

/// Maximum number of user-declared states.
pub const MAX_STATES: usize = 32;

/// Maximum length of a state name in bytes. Longer names are truncated.
pub const MAX_STATE_NAME_LEN: usize = 15;

/// Fixed-capacity table of user state names.
///
/// Reserved names are never stored here. Each distinct name is stored once
/// and keeps its identity for the lifetime of the registry.
#[derive(Debug, Clone)]
pub struct StateRegistry {
    names: Vec<String>,
    capacity: usize,
}

impl StateRegistry {
    /// Creates an empty registry with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MAX_STATES)
    }

    /// Creates an empty registry holding at most `capacity` names.
    ///
    /// The capacity is limited to the number of identities a [`StateId`] can
    /// address.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(usize::from(u8::MAX - StateId::FIRST_USER) + 1);
        Self {
            names: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns the identity for `name`, registering it if needed.
    ///
    /// Reserved names resolve to their fixed identities without insertion.
    /// Returns `None` for an empty name or when the registry is full.
    pub fn intern(&mut self, name: &str) -> Option<StateId> {
        if let Some(id) = StateId::reserved(name) {
            return Some(id);
        }
        if let Some(id) = self.lookup(name) {
            return Some(id);
        }
        let name = bounded_name(name);
        if name.is_empty() || self.names.len() >= self.capacity {
            return None;
        }

        self.names.push(name.to_string());
        Some(Self::id_at(self.names.len() - 1))
    }

    /// Looks up the identity of an already registered (or reserved) name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<StateId> {
        if let Some(id) = StateId::reserved(name) {
            return Some(id);
        }
        let name = bounded_name(name);
        self.names
            .iter()
            .position(|known| known == name)
            .map(Self::id_at)
    }

    /// Returns the name registered for a user identity.
    #[must_use]
    pub fn name(&self, id: StateId) -> Option<&str> {
        id.registry_index()
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
    }

    /// Returns true if `id` is a registered user identity.
    #[must_use]
    pub fn contains(&self, id: StateId) -> bool {
        self.name(id).is_some()
    }

    /// Returns the number of registered user states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no user state has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the maximum number of user states.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn id_at(index: usize) -> StateId {
        // Capacity is bounded so that every index fits.
        let offset = u8::try_from(index).unwrap_or(u8::MAX - StateId::FIRST_USER);
        StateId::from_raw(StateId::FIRST_USER + offset)
    }
}

impl Default for StateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn bounded_name(name: &str) -> &str {
    truncate_str(name, MAX_STATE_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_declaration_order() {
        let mut registry = StateRegistry::new();
        assert_eq!(registry.intern("IDLE"), Some(StateId::from_raw(2)));
        assert_eq!(registry.intern("RUNNING"), Some(StateId::from_raw(3)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicates_are_not_reinserted() {
        let mut registry = StateRegistry::new();
        let first = registry.intern("IDLE");
        let second = registry.intern("IDLE");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reserved_names_never_inserted() {
        let mut registry = StateRegistry::new();
        assert_eq!(registry.intern("OFFLINE"), Some(StateId::OFFLINE));
        assert_eq!(registry.intern("CONNECTED"), Some(StateId::CONNECTED));
        assert!(registry.is_empty());
    }

    #[test]
    fn full_registry_rejects_new_names() {
        let mut registry = StateRegistry::with_capacity(2);
        registry.intern("A");
        registry.intern("B");
        assert_eq!(registry.intern("C"), None);
        assert_eq!(registry.lookup("C"), None);
        // Existing names still resolve.
        assert_eq!(registry.intern("A"), Some(StateId::from_raw(2)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut registry = StateRegistry::new();
        assert_eq!(registry.intern(""), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn long_names_are_truncated_consistently() {
        let mut registry = StateRegistry::new();
        let id = registry.intern("A_VERY_LONG_STATE_NAME").unwrap();
        assert_eq!(registry.name(id), Some("A_VERY_LONG_STA"));
        assert_eq!(registry.lookup("A_VERY_LONG_STATE_NAME"), Some(id));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // 14 ASCII bytes followed by a two-byte character straddling the bound.
        let name = "ABCDEFGHIJKLMNé";
        assert_eq!(bounded_name(name), "ABCDEFGHIJKLMN");
    }

    #[test]
    fn unknown_ids_have_no_name() {
        let registry = StateRegistry::new();
        assert_eq!(registry.name(StateId::from_raw(2)), None);
        assert_eq!(registry.name(StateId::OFFLINE), None);
        assert!(!registry.contains(StateId::from_raw(9)));
    }
}
