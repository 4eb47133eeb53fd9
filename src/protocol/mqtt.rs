// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT session on top of `rumqttc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::state::MAX_RULES;
use crate::subscription::{MAX_RAW_SUBSCRIPTIONS, Qos};

use super::{EventSink, Session, SessionConfig};

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity of the request channel between client and event loop.
///
/// Holds a full resubscription burst with room left for publishes.
const REQUEST_CAPACITY: usize = MAX_RULES + MAX_RAW_SUBSCRIPTIONS + 16;

/// How long a stopped session may take to flush its DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// A [`Session`] backed by a `rumqttc` client.
///
/// Each [`start`](Session::start) creates a fresh client with a clean
/// session and spawns a driver task that polls its event loop. The driver
/// ends at the first connection error, after reporting the loss, so that
/// retry timing stays with the node's supervisor.
///
/// Must be started from within a tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use statemq::protocol::{HostLink, MqttSession};
/// use statemq::{Node, NodeConfig};
///
/// # async fn example() -> statemq::Result<()> {
/// let node = Node::new(Arc::new(HostLink::new()), Arc::new(MqttSession::new()));
/// node.declare_state_rule("lab/node/cmd", "run", "RUNNING");
/// node.begin(NodeConfig::new("lab", "secret", "mqtt://192.168.1.50:1883")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttSession {
    active: Mutex<Option<ActiveSession>>,
}

#[derive(Debug)]
struct ActiveSession {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

impl ActiveSession {
    fn shutdown(self) {
        if self.client.try_disconnect().is_err() {
            self.driver.abort();
            return;
        }
        // Let the event loop flush the DISCONNECT, then make sure it is gone.
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let driver = self.driver;
                runtime.spawn(async move {
                    tokio::time::sleep(DISCONNECT_GRACE).await;
                    driver.abort();
                });
            }
            Err(_) => self.driver.abort(),
        }
    }
}

impl MqttSession {
    /// Creates an idle session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a session attempt is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    fn with_client<R>(
        &self,
        f: impl FnOnce(&AsyncClient) -> Result<R, rumqttc::ClientError>,
    ) -> Result<R, ProtocolError> {
        let active = self.active.lock();
        let session = active.as_ref().ok_or(ProtocolError::NotConnected)?;
        f(&session.client).map_err(ProtocolError::Mqtt)
    }
}

impl Session for MqttSession {
    fn start(&self, config: &SessionConfig, events: EventSink) -> Result<(), ProtocolError> {
        let (host, port) = parse_mqtt_url(&config.endpoint)?;
        let client_id = config.client_id.clone().unwrap_or_else(next_client_id);

        let mut mqtt_options = MqttOptions::new(&client_id, host.clone(), port);
        mqtt_options.set_keep_alive(config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some(will) = &config.last_will {
            mqtt_options.set_last_will(rumqttc::LastWill::new(
                &will.topic,
                will.payload.as_bytes().to_vec(),
                will.qos.into(),
                will.retain,
            ));
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);
        let driver = tokio::spawn(drive_session(event_loop, events));

        tracing::debug!(
            host = %host,
            port = port,
            client_id = %client_id,
            "MQTT session started"
        );

        if let Some(previous) = self.active.lock().replace(ActiveSession { client, driver }) {
            previous.shutdown();
        }
        Ok(())
    }

    fn stop(&self) {
        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            tracing::debug!("MQTT session stopped");
            previous.shutdown();
        }
    }

    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Qos,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        self.with_client(|client| client.try_publish(topic, qos.into(), retain, payload.to_vec()))
    }

    fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ProtocolError> {
        self.with_client(|client| client.try_subscribe(topic, qos.into()))
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.driver.abort();
        }
    }
}

/// Generates a unique client ID (PID + counter).
fn next_client_id() -> String {
    let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("statemq_{}_{}", std::process::id(), counter)
}

/// Parses an MQTT URL into host and port.
///
/// Accepts `mqtt://host:port`, `tcp://host:port` or a bare `host[:port]`.
/// The port defaults to 1883.
///
/// # Errors
///
/// Returns `ProtocolError::InvalidAddress` for an empty host or an
/// unparsable port.
pub fn parse_mqtt_url(url: &str) -> Result<(String, u16), ProtocolError> {
    let url = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url)
        .trim_end_matches('/');

    let (host, port) = if let Some((h, p)) = url.rsplit_once(':') {
        let port = p
            .parse()
            .map_err(|_| ProtocolError::InvalidAddress(format!("Invalid port: {p}")))?;
        (h.to_string(), port)
    } else {
        (url.to_string(), 1883)
    };

    if host.is_empty() {
        return Err(ProtocolError::InvalidAddress("Missing host".to_string()));
    }

    Ok((host, port))
}

/// Polls the event loop and reports session events until the connection ends.
async fn drive_session(mut event_loop: EventLoop, events: EventSink) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT connected");
                events.session_connected();
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::trace!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message"
                );
                events.message(publish.topic, publish.payload.to_vec());
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::warn!("MQTT broker closed the session");
                events.session_disconnected();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT session lost");
                events.session_disconnected();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mqtt_url_with_port() {
        let (host, port) = parse_mqtt_url("mqtt://192.168.1.50:1883").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("192.168.1.50").unwrap();
        assert_eq!(host, "192.168.1.50");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_tcp_scheme() {
        let (host, port) = parse_mqtt_url("tcp://broker.local:8883/").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 8883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_input() {
        assert!(matches!(
            parse_mqtt_url("mqtt://broker:port"),
            Err(ProtocolError::InvalidAddress(_))
        ));
        assert!(matches!(
            parse_mqtt_url("mqtt://"),
            Err(ProtocolError::InvalidAddress(_))
        ));
    }

    #[test]
    fn client_ids_are_unique() {
        let first = next_client_id();
        let second = next_client_id();
        assert_ne!(first, second);
        assert!(first.starts_with("statemq_"));
    }

    #[test]
    fn requests_without_session_fail() {
        let session = MqttSession::new();
        assert!(!session.is_active());
        assert!(matches!(
            session.publish("t", b"p", Qos::AtMostOnce, false),
            Err(ProtocolError::NotConnected)
        ));
        assert!(matches!(
            session.subscribe("t", Qos::AtMostOnce),
            Err(ProtocolError::NotConnected)
        ));
        session.stop();
    }

    #[tokio::test]
    async fn start_and_stop_without_broker() {
        let (queue, _rx) = crate::protocol::event_queue();
        let session = MqttSession::new();
        let config = SessionConfig {
            endpoint: "mqtt://127.0.0.1:1".to_string(),
            client_id: Some("statemq-test".to_string()),
            keep_alive: Duration::from_secs(30),
            last_will: None,
        };

        session.start(&config, queue.sink(0)).unwrap();
        assert!(session.is_active());
        // Requests are queued even before the broker answers.
        assert!(session.subscribe("t", Qos::AtLeastOnce).is_ok());

        session.stop();
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn full_resubscription_fits_request_queue() {
        let (queue, _rx) = crate::protocol::event_queue();
        let session = MqttSession::new();
        let config = SessionConfig {
            endpoint: "mqtt://127.0.0.1:1".to_string(),
            client_id: Some("statemq-burst".to_string()),
            keep_alive: Duration::from_secs(30),
            last_will: None,
        };
        session.start(&config, queue.sink(0)).unwrap();

        // Queued synchronously, before the driver gets a chance to drain.
        for i in 0..MAX_RULES + MAX_RAW_SUBSCRIPTIONS {
            assert!(
                session.subscribe(&format!("burst/{i}"), Qos::AtMostOnce).is_ok(),
                "subscription {i} was refused"
            );
        }

        session.stop();
        assert!(!session.is_active());
    }
}
