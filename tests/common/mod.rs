// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted link and session collaborators for node tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use statemq::protocol::{LinkCredentials, SessionConfig};
use statemq::{EventSink, Link, Node, ProtocolError, Qos, Session};

/// A link that records connect attempts and optionally comes up at once.
#[derive(Default)]
pub struct MockLink {
    pub auto_up: AtomicBool,
    pub up: AtomicBool,
    pub disconnects: AtomicUsize,
    pub attempts: Mutex<Vec<(LinkCredentials, EventSink)>>,
}

impl MockLink {
    pub fn auto() -> Arc<Self> {
        let link = Self::default();
        link.auto_up.store(true, Ordering::SeqCst);
        Arc::new(link)
    }

    pub fn manual() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn last_sink(&self) -> EventSink {
        self.attempts.lock().last().expect("no link attempt").1.clone()
    }
}

impl Link for MockLink {
    fn connect(
        &self,
        credentials: &LinkCredentials,
        events: EventSink,
    ) -> Result<(), ProtocolError> {
        if self.auto_up.load(Ordering::SeqCst) {
            self.up.store(true, Ordering::SeqCst);
            events.link_up();
        }
        self.attempts.lock().push((credentials.clone(), events));
        Ok(())
    }

    fn disconnect(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

/// A publish request seen by [`MockSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retain: bool,
}

impl Published {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("payload is not JSON")
    }
}

/// A session that records every request and optionally connects at once.
#[derive(Default)]
pub struct MockSession {
    pub auto_connect: AtomicBool,
    pub fail_start: AtomicBool,
    pub stops: AtomicUsize,
    pub starts: Mutex<Vec<(SessionConfig, EventSink)>>,
    pub subscriptions: Mutex<Vec<(String, Qos)>>,
    pub published: Mutex<Vec<Published>>,
}

impl MockSession {
    pub fn auto() -> Arc<Self> {
        let session = Self::default();
        session.auto_connect.store(true, Ordering::SeqCst);
        Arc::new(session)
    }

    pub fn manual() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }

    pub fn last_sink(&self) -> EventSink {
        self.starts.lock().last().expect("no session start").1.clone()
    }

    pub fn last_config(&self) -> SessionConfig {
        self.starts.lock().last().expect("no session start").0.clone()
    }

    pub fn subscribed(&self) -> Vec<(String, Qos)> {
        self.subscriptions.lock().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.published
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }
}

impl Session for MockSession {
    fn start(&self, config: &SessionConfig, events: EventSink) -> Result<(), ProtocolError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ProtocolError::ConnectionFailed("scripted".to_string()));
        }
        if self.auto_connect.load(Ordering::SeqCst) {
            events.session_connected();
        }
        self.starts.lock().push((config.clone(), events));
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        self.published.lock().push(Published {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ProtocolError> {
        self.subscriptions.lock().push((topic.to_string(), qos));
        Ok(())
    }
}

pub fn node(link: &Arc<MockLink>, session: &Arc<MockSession>) -> Node {
    Node::new(link.clone(), session.clone())
}

/// Lets the supervisor loop drain its queue.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
