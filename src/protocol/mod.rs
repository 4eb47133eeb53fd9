// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Link and message-bus session collaborators.
//!
//! A node drives two platform collaborators:
//!
//! - a [`Link`], the physical network attachment (for example WiFi), which
//!   reports when it gains or loses an address;
//! - a [`Session`], the message-bus client, which reports when the session
//!   is established or lost and delivers inbound messages.
//!
//! Both report through an [`EventSink`] handed to them on every connect or
//! start. Events are queued to the node's connectivity supervisor and
//! processed in order on its loop. A sink stays tied to the attempt it was
//! created for; events sent through the sink of a superseded attempt are
//! discarded.
//!
//! At most [`MESSAGE_BACKLOG`] inbound messages wait in the queue at once.
//! Messages arriving past that are dropped and logged. Link and session
//! events are always queued.
//!
//! # Implementations
//!
//! - [`HostLink`]: a link for hosted targets whose network is always up
//! - [`MqttSession`]: an MQTT session on top of `rumqttc` (feature `mqtt`)

mod link;
#[cfg(feature = "mqtt")]
mod mqtt;

pub use link::HostLink;
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttSession, parse_mqtt_url};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::subscription::{LastWill, Qos};

/// Credentials used to bring the link up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkCredentials {
    /// Network name.
    pub ssid: String,
    /// Network passphrase. May be empty.
    pub credential: String,
}

/// Parameters for starting a message-bus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Broker endpoint (`mqtt://host:port`, `tcp://host:port` or `host[:port]`).
    pub endpoint: String,
    /// Client identifier. Generated by the session when absent.
    pub client_id: Option<String>,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Last will registered with the broker.
    pub last_will: Option<LastWill>,
}

/// Physical link collaborator.
pub trait Link: Send + Sync {
    /// Starts bringing the link up.
    ///
    /// Completion is reported through [`EventSink::link_up`]; failure or later
    /// loss through [`EventSink::link_down`].
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the attempt could not be started at all.
    fn connect(&self, credentials: &LinkCredentials, events: EventSink)
    -> Result<(), ProtocolError>;

    /// Tears the link down. Does not report an event.
    fn disconnect(&self);

    /// Returns whether the link currently has an address.
    fn is_up(&self) -> bool;
}

/// Message-bus session collaborator.
pub trait Session: Send + Sync {
    /// Starts a session attempt, replacing any previous one.
    ///
    /// Establishment is reported through [`EventSink::session_connected`],
    /// failure or loss through [`EventSink::session_disconnected`].
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the attempt could not be started at all.
    fn start(&self, config: &SessionConfig, events: EventSink) -> Result<(), ProtocolError>;

    /// Stops the current session attempt, if any. Does not report an event.
    fn stop(&self);

    /// Queues a message for publishing.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if no session is active or the request could
    /// not be queued.
    fn publish(&self, topic: &str, payload: &[u8], qos: Qos, retain: bool)
    -> Result<(), ProtocolError>;

    /// Queues a subscription request.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if no session is active or the request could
    /// not be queued. The node retries failed subscriptions on its tick.
    fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ProtocolError>;
}

/// Link-layer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link obtained an address.
    GotAddress,
    /// The link lost its address or failed to connect.
    LostAddress,
}

/// Message-bus session events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session was established.
    Connected,
    /// The session attempt failed or the session was lost.
    Disconnected,
    /// An inbound message arrived.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
}

/// An event queued to the connectivity supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConnectivityEvent {
    Link { generation: u64, event: LinkEvent },
    Session { generation: u64, event: SessionEvent },
}

/// Inbound messages that may wait for the supervisor at once.
pub const MESSAGE_BACKLOG: usize = 64;

/// Creates the supervisor's event queue.
pub(crate) fn event_queue() -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let backlog = Arc::new(AtomicUsize::new(0));
    (
        EventQueue {
            tx,
            backlog: backlog.clone(),
        },
        EventReceiver { rx, backlog },
    )
}

/// Sending half of the supervisor's event queue.
#[derive(Debug, Clone)]
pub(crate) struct EventQueue {
    tx: mpsc::UnboundedSender<ConnectivityEvent>,
    backlog: Arc<AtomicUsize>,
}

impl EventQueue {
    /// Returns a sink whose events carry `generation`.
    pub(crate) fn sink(&self, generation: u64) -> EventSink {
        EventSink {
            tx: self.tx.clone(),
            backlog: self.backlog.clone(),
            generation,
        }
    }
}

/// Receiving half of the supervisor's event queue.
#[derive(Debug)]
pub(crate) struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ConnectivityEvent>,
    backlog: Arc<AtomicUsize>,
}

impl EventReceiver {
    pub(crate) async fn recv(&mut self) -> Option<ConnectivityEvent> {
        let event = self.rx.recv().await?;
        Some(self.release(event))
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<ConnectivityEvent> {
        self.rx.try_recv().ok().map(|event| self.release(event))
    }

    fn release(&self, event: ConnectivityEvent) -> ConnectivityEvent {
        if event.is_message() {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
        }
        event
    }
}

impl ConnectivityEvent {
    fn is_message(&self) -> bool {
        matches!(
            self,
            Self::Session {
                event: SessionEvent::Message { .. },
                ..
            }
        )
    }
}

/// Reporting handle given to [`Link`] and [`Session`] implementations.
///
/// Each method returns false if the event was not queued: the node no
/// longer listens, or an inbound message found the backlog full.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ConnectivityEvent>,
    backlog: Arc<AtomicUsize>,
    generation: u64,
}

impl EventSink {
    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    fn link(&self, event: LinkEvent) -> bool {
        self.tx
            .send(ConnectivityEvent::Link {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    fn session(&self, event: SessionEvent) -> bool {
        self.tx
            .send(ConnectivityEvent::Session {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Reports that the link obtained an address.
    pub fn link_up(&self) -> bool {
        self.link(LinkEvent::GotAddress)
    }

    /// Reports that the link is down.
    pub fn link_down(&self) -> bool {
        self.link(LinkEvent::LostAddress)
    }

    /// Reports that the session was established.
    pub fn session_connected(&self) -> bool {
        self.session(SessionEvent::Connected)
    }

    /// Reports that the session attempt failed or the session was lost.
    pub fn session_disconnected(&self) -> bool {
        self.session(SessionEvent::Disconnected)
    }

    /// Delivers an inbound message.
    ///
    /// The message is dropped if [`MESSAGE_BACKLOG`] messages are already
    /// waiting.
    pub fn message(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> bool {
        if self.backlog.fetch_add(1, Ordering::AcqRel) >= MESSAGE_BACKLOG {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
            let topic = topic.into();
            tracing::warn!(topic = %topic, "Event backlog full, dropping message");
            return false;
        }
        let queued = self.session(SessionEvent::Message {
            topic: topic.into(),
            payload: payload.into(),
        });
        if !queued {
            self.backlog.fetch_sub(1, Ordering::AcqRel);
        }
        queued
    }

    /// Returns true if the node has stopped listening.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_tags_events_with_generation() {
        let (queue, mut rx) = event_queue();
        let sink = queue.sink(7);

        assert!(sink.session_connected());
        assert!(sink.message("t", b"p".to_vec()));
        assert!(sink.link_down());

        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectivityEvent::Session {
                generation: 7,
                event: SessionEvent::Connected
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectivityEvent::Session {
                generation: 7,
                event: SessionEvent::Message {
                    topic: "t".to_string(),
                    payload: b"p".to_vec()
                }
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectivityEvent::Link {
                generation: 7,
                event: LinkEvent::LostAddress
            }
        );
    }

    #[test]
    fn closed_sink_reports_false() {
        let (queue, rx) = event_queue();
        let sink = queue.sink(0);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.link_up());
        assert!(!sink.message("t", b"p".to_vec()));
    }

    #[test]
    fn message_backlog_is_bounded() {
        let (queue, mut rx) = event_queue();
        let sink = queue.sink(1);

        for i in 0..MESSAGE_BACKLOG {
            assert!(sink.message(format!("t/{i}"), b"p".to_vec()));
        }
        assert!(!sink.message("t/overflow", b"p".to_vec()));
        // State events bypass the message bound.
        assert!(sink.session_disconnected());

        // Draining one message frees one slot.
        assert!(rx.try_recv().is_some());
        assert!(sink.message("t/late", b"p".to_vec()));
        assert!(!sink.message("t/late2", b"p".to_vec()));

        let mut topics = Vec::new();
        while let Some(event) = rx.try_recv() {
            if let ConnectivityEvent::Session {
                event: SessionEvent::Message { topic, .. },
                ..
            } = event
            {
                topics.push(topic);
            }
        }
        assert_eq!(topics.len(), MESSAGE_BACKLOG);
        assert_eq!(topics.last().map(String::as_str), Some("t/late"));
        assert!(!topics.iter().any(|t| t == "t/overflow"));
    }
}
