// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `StateMQ` library.
//!
//! Most failures in this crate are deliberately *not* errors: full tables,
//! unknown ids and oversized messages are reported through return values
//! (`StateId` fallbacks, `Option`, `bool`). The types here cover the places
//! where a real error crosses an API boundary: configuration validation
//! and the link/session collaborators.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by a link or session collaborator.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The node configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by the link and message-bus session collaborators.
///
/// The connectivity supervisor absorbs these into its retry loop; they are
/// only visible to code that drives a [`Link`](crate::protocol::Link) or
/// [`Session`](crate::protocol::Session) directly.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// MQTT client request failed.
    #[cfg(feature = "mqtt")]
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker endpoint or address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// No session is currently established.
    #[error("session is not connected")]
    NotConnected,
}

/// Errors related to node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The link SSID is empty.
    #[error("link ssid is required")]
    MissingSsid,

    /// The broker endpoint is empty.
    #[error("broker endpoint is required")]
    MissingBroker,

    /// The configuration document could not be parsed.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
