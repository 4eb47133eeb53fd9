// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stable small-integer state identities.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the reserved disconnected state.
pub const OFFLINE_STATE: &str = "OFFLINE";

/// Name of the reserved "connected, no user state yet" state.
pub const CONNECTED_STATE: &str = "CONNECTED";

/// Identity of a logical node state.
///
/// Layout:
/// - `0` is the reserved [`OFFLINE`](Self::OFFLINE) state
/// - `1` is the reserved [`CONNECTED`](Self::CONNECTED) state
/// - `2..` are user-declared states, in declaration order
///
/// Identities are stable for the lifetime of the engine that issued them and
/// are never reused or reordered.
///
/// # Examples
///
/// ```
/// use statemq::StateId;
///
/// assert!(StateId::OFFLINE.is_reserved());
/// assert_eq!(StateId::CONNECTED.value(), 1);
/// assert!(StateId::from_raw(2).is_user());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(u8);

impl StateId {
    /// The reserved disconnected state.
    pub const OFFLINE: Self = Self(0);

    /// The reserved connected state, entered when no user state applies.
    pub const CONNECTED: Self = Self(1);

    /// First identity handed out to user-declared states.
    pub(crate) const FIRST_USER: u8 = 2;

    /// Creates an identity from its raw value.
    #[must_use]
    pub const fn from_raw(value: u8) -> Self {
        Self(value)
    }

    /// Returns the raw value of this identity.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns true for `OFFLINE` and `CONNECTED`.
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    /// Returns true for user-declared identities.
    #[must_use]
    pub const fn is_user(self) -> bool {
        !self.is_reserved()
    }

    /// Index of this identity in the state registry, if it is a user state.
    pub(crate) fn registry_index(self) -> Option<usize> {
        self.0.checked_sub(Self::FIRST_USER).map(usize::from)
    }

    /// Returns the reserved identity for a reserved state name.
    #[must_use]
    pub fn reserved(name: &str) -> Option<Self> {
        match name {
            OFFLINE_STATE => Some(Self::OFFLINE),
            CONNECTED_STATE => Some(Self::CONNECTED),
            _ => None,
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
