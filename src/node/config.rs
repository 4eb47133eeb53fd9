// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Node configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::LinkCredentials;

/// Keep-alive used when none (or zero) is configured.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Default cadence of the connectivity supervisor tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for starting a node.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use statemq::NodeConfig;
///
/// let config = NodeConfig::new("lab-net", "secret", "mqtt://192.168.1.50:1883")
///     .with_client_id("lab-node-1")
///     .with_keep_alive_secs(15);
///
/// assert_eq!(config.keep_alive(), Some(Duration::from_secs(15)));
///
/// let loaded = NodeConfig::from_json(
///     r#"{ "ssid": "lab-net", "broker": "192.168.1.50", "tick_interval_ms": 100 }"#,
/// )
/// .unwrap();
/// assert_eq!(loaded.tick_interval, Duration::from_millis(100));
/// assert_eq!(loaded.reconnect.initial_delay, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Link network name.
    pub ssid: String,
    /// Link passphrase.
    pub credential: String,
    /// Broker endpoint.
    pub broker: String,
    /// MQTT client identifier. Generated when absent.
    pub client_id: Option<String>,
    /// Keep-alive in seconds. Overrides the node setting when present.
    pub keep_alive_secs: Option<u16>,
    /// Connectivity supervisor tick cadence.
    #[serde(rename = "tick_interval_ms", with = "duration_ms")]
    pub tick_interval: Duration,
    /// Bounded wait for the node lock before a task tick.
    #[serde(rename = "task_acquire_timeout_ms", with = "duration_ms")]
    pub task_acquire_timeout: Duration,
    /// Reconnection backoff policy for link and session.
    pub reconnect: ReconnectPolicy,
}

impl NodeConfig {
    /// Creates a configuration with default timing.
    #[must_use]
    pub fn new(
        ssid: impl Into<String>,
        credential: impl Into<String>,
        broker: impl Into<String>,
    ) -> Self {
        Self {
            ssid: ssid.into(),
            credential: credential.into(),
            broker: broker.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration document.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Json` if the document is malformed.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Sets the MQTT client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the keep-alive in seconds. Zero selects the default.
    #[must_use]
    pub fn with_keep_alive_secs(mut self, secs: u16) -> Self {
        self.keep_alive_secs = Some(secs);
        self
    }

    /// Sets the supervisor tick cadence.
    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the bounded lock wait before task ticks.
    #[must_use]
    pub fn with_task_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.task_acquire_timeout = timeout;
        self
    }

    /// Sets the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Returns the configured keep-alive, if any.
    #[must_use]
    pub fn keep_alive(&self) -> Option<Duration> {
        self.keep_alive_secs.map(keep_alive_from_secs)
    }

    /// Checks that the configuration can start a node.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the SSID or broker endpoint is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ssid.is_empty() {
            return Err(ConfigError::MissingSsid);
        }
        if self.broker.is_empty() {
            return Err(ConfigError::MissingBroker);
        }
        Ok(())
    }

    pub(crate) fn link_credentials(&self) -> LinkCredentials {
        LinkCredentials {
            ssid: self.ssid.clone(),
            credential: self.credential.clone(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            credential: String::new(),
            broker: String::new(),
            client_id: None,
            keep_alive_secs: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            task_acquire_timeout: crate::task::DEFAULT_ACQUIRE_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Converts a keep-alive in seconds, mapping zero to the default.
pub(crate) fn keep_alive_from_secs(secs: u16) -> Duration {
    if secs == 0 {
        DEFAULT_KEEP_ALIVE
    } else {
        Duration::from_secs(u64::from(secs))
    }
}

/// Exponential backoff for link and session reconnection.
///
/// Retries never stop; the delay grows from `initial_delay` by
/// `backoff_multiplier` per failed attempt, capped at `max_delay`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use statemq::ReconnectPolicy;
///
/// let policy = ReconnectPolicy::default();
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(2));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(4));
/// assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
///
/// let fast = ReconnectPolicy::new()
///     .with_initial_delay(Duration::from_millis(500))
///     .with_max_delay(Duration::from_secs(5));
/// assert_eq!(fast.delay_for_attempt(4), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry, and the floor the backoff resets to.
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    /// Ceiling of the retry delay.
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    /// Multiplier applied per failed attempt.
    pub backoff_multiplier: f32,
}

impl ReconnectPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial delay (the backoff floor).
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay (the backoff ceiling).
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay for a given retry attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));

        // Safe: delays are seconds, far from f32 precision limits
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.initial_delay.as_millis() as f32 * multiplier;

        // Safe: float-to-int casts saturate
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Serde helper for durations stored as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
