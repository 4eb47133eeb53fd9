// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connectivity supervision.
//!
//! The [`Supervisor`] owns the link and session collaborators, the
//! subscription tables, the telemetry configuration and the live task
//! runners of a node. It runs a loop on the tokio runtime that processes
//! collaborator events in order and ticks at a fixed cadence to retry lost
//! connectivity:
//!
//! ```text
//!             link up                 session established
//! LinkDown ───────────▶ SessionDown ──────────────────────▶ SessionUp
//!    ▲                    ▲     │ retry (backoff)              │
//!    │ link down          │     └──────────────┘               │
//!    └────────────────────┴────────────── session lost ────────┘
//! ```
//!
//! Collaborator failures never surface as errors; they are logged and fed
//! into the backoff. Subscriptions the session could not queue are kept and
//! retried on the tick while the session stays up.

mod backoff;
mod telemetry;

pub use telemetry::StateReport;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bounded::decode_bounded;
use crate::node::{DEFAULT_KEEP_ALIVE, NodeConfig, ReconnectPolicy};
use crate::protocol::{
    ConnectivityEvent, EventQueue, EventReceiver, Link, LinkCredentials, LinkEvent, Session,
    SessionConfig, SessionEvent, event_queue,
};
use crate::state::{StateChange, StateEngine, StateObserver};
use crate::subscription::{LastWill, Qos, RAW_PAYLOAD_LEN, RAW_TOPIC_LEN, SubscriptionResolver};
use crate::sync::NodeLock;
use crate::task::{Scheduler, TaskId};

use backoff::Backoff;
use telemetry::StatePublisher;

/// Connectivity phase of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Connectivity {
    /// The link has no address.
    LinkDown,
    /// The link is up but no session is established.
    SessionDown,
    /// The message-bus session is established.
    SessionUp,
}

struct SessionSettings {
    resolver: SubscriptionResolver,
    publish_qos: Qos,
    keep_alive: Duration,
    last_will: Option<LastWill>,
}

struct Connection {
    phase: Connectivity,
    events: Option<EventQueue>,
    next_generation: u64,
    run_generation: u64,
    session_generation: u64,
    session_active: bool,
    pending_subscriptions: Vec<(String, Qos)>,
    link_backoff: Backoff,
    session_backoff: Backoff,
    credentials: LinkCredentials,
    endpoint: String,
    client_id: Option<String>,
}

impl Connection {
    fn is_running(&self) -> bool {
        self.events.is_some()
    }

    fn issue_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn accepts_link(&self, generation: u64) -> bool {
        self.is_running() && generation == self.run_generation
    }

    fn accepts_session(&self, generation: u64) -> bool {
        self.is_running() && self.session_active && generation == self.session_generation
    }
}

struct RunHandles {
    driver: JoinHandle<()>,
    scheduler: Scheduler,
}

enum Retry {
    Link,
    Session,
    Subscriptions(Vec<(String, Qos)>),
}

/// Drives link and session connectivity for one node.
pub(crate) struct Supervisor {
    lock: NodeLock,
    engine: Arc<StateEngine>,
    link: Arc<dyn Link>,
    session: Arc<dyn Session>,
    settings: Mutex<SessionSettings>,
    telemetry: Mutex<StatePublisher>,
    connection: Mutex<Connection>,
    observer: Mutex<Option<StateObserver>>,
    started_at: Mutex<Instant>,
    handles: Mutex<Option<RunHandles>>,
}

impl Supervisor {
    /// Creates a supervisor and installs its dispatcher as the engine's
    /// observer.
    pub(crate) fn new(
        engine: Arc<StateEngine>,
        link: Arc<dyn Link>,
        session: Arc<dyn Session>,
    ) -> Arc<Self> {
        let policy = ReconnectPolicy::default();
        let supervisor = Arc::new(Self {
            lock: engine.lock().clone(),
            engine,
            link,
            session,
            settings: Mutex::new(SessionSettings {
                resolver: SubscriptionResolver::new(),
                publish_qos: Qos::default(),
                keep_alive: DEFAULT_KEEP_ALIVE,
                last_will: None,
            }),
            telemetry: Mutex::new(StatePublisher::default()),
            connection: Mutex::new(Connection {
                phase: Connectivity::LinkDown,
                events: None,
                next_generation: 0,
                run_generation: 0,
                session_generation: 0,
                session_active: false,
                pending_subscriptions: Vec::new(),
                link_backoff: Backoff::new(policy.clone()),
                session_backoff: Backoff::new(policy),
                credentials: LinkCredentials::default(),
                endpoint: String::new(),
                client_id: None,
            }),
            observer: Mutex::new(None),
            started_at: Mutex::new(Instant::now()),
            handles: Mutex::new(None),
        });

        let dispatcher = Arc::downgrade(&supervisor);
        supervisor.engine.on_state_change(move |change| {
            if let Some(supervisor) = dispatcher.upgrade() {
                supervisor.dispatch(change);
            }
        });

        supervisor
    }

    pub(crate) fn engine(&self) -> &StateEngine {
        &self.engine
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts connectivity and task execution, replacing any previous run.
    pub(crate) async fn start(self: &Arc<Self>, config: &NodeConfig) {
        self.stop(false).await;

        let events = self.prepare(config);
        let driver = tokio::spawn(Self::run(
            Arc::downgrade(self),
            events,
            config.tick_interval,
        ));
        let scheduler = Scheduler::spawn(
            self.engine.task_defs(),
            &self.lock,
            config.task_acquire_timeout,
        );
        tracing::info!(
            broker = %config.broker,
            tasks = scheduler.len(),
            "Node started"
        );
        *self.handles.lock() = Some(RunHandles { driver, scheduler });

        self.connect_link();
    }

    fn prepare(&self, config: &NodeConfig) -> EventReceiver {
        let (tx, rx) = event_queue();
        let now = Instant::now();

        if let Some(keep_alive) = config.keep_alive() {
            self.settings.lock().keep_alive = keep_alive;
        }
        {
            let mut connection = self.connection.lock();
            connection.run_generation = connection.issue_generation();
            connection.events = Some(tx);
            connection.phase = Connectivity::LinkDown;
            connection.session_active = false;
            connection.pending_subscriptions.clear();
            connection.link_backoff = Backoff::new(config.reconnect.clone());
            connection.session_backoff = Backoff::new(config.reconnect.clone());
            connection.link_backoff.schedule(now);
            connection.credentials = config.link_credentials();
            connection.endpoint.clone_from(&config.broker);
            connection.client_id.clone_from(&config.client_id);
        }
        *self.started_at.lock() = now;

        self.engine.set_connected(false);
        rx
    }

    /// Stops tasks and the supervisor loop, then releases session and link.
    ///
    /// Returns false if nothing was running.
    pub(crate) async fn stop(&self, disconnect_link: bool) -> bool {
        let handles = self.handles.lock().take();
        let Some(RunHandles { driver, scheduler }) = handles else {
            return false;
        };

        scheduler.shutdown().await;
        driver.abort();
        // Cancellation is the expected outcome.
        let _ = driver.await;

        {
            let mut connection = self.connection.lock();
            connection.events = None;
            connection.phase = Connectivity::LinkDown;
            connection.session_active = false;
            connection.pending_subscriptions.clear();
            connection.link_backoff.reset();
            connection.session_backoff.reset();
        }
        self.session.stop();
        if disconnect_link {
            self.link.disconnect();
        }
        self.engine.set_connected(false);

        tracing::info!(disconnect_link, "Node stopped");
        true
    }

    /// Clears subscription, last-will and telemetry configuration.
    pub(crate) fn clear_configuration(&self) {
        {
            let mut settings = self.settings.lock();
            settings.resolver.clear();
            settings.last_will = None;
        }
        self.telemetry.lock().disable();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handles.lock().is_some()
    }

    async fn run(
        supervisor: Weak<Self>,
        mut events: EventReceiver,
        tick: Duration,
    ) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Some(supervisor) = supervisor.upgrade() else { break };
                    supervisor.handle_event(event);
                }
                _ = ticker.tick() => {
                    let Some(supervisor) = supervisor.upgrade() else { break };
                    supervisor.on_tick();
                }
            }
        }

        tracing::trace!("Supervisor loop exited");
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub(crate) fn handle_event(&self, event: ConnectivityEvent) {
        match event {
            ConnectivityEvent::Link { generation, event } => {
                if !self.connection.lock().accepts_link(generation) {
                    tracing::trace!(generation, ?event, "Ignoring stale link event");
                    return;
                }
                match event {
                    LinkEvent::GotAddress => self.on_link_up(),
                    LinkEvent::LostAddress => self.on_link_down(),
                }
            }
            ConnectivityEvent::Session { generation, event } => {
                if !self.connection.lock().accepts_session(generation) {
                    tracing::trace!(generation, "Ignoring stale session event");
                    return;
                }
                match event {
                    SessionEvent::Connected => self.on_session_up(),
                    SessionEvent::Disconnected => self.on_session_down(),
                    SessionEvent::Message { topic, payload } => self.on_message(&topic, &payload),
                }
            }
        }
    }

    fn on_link_up(&self) {
        {
            let mut connection = self.connection.lock();
            connection.link_backoff.reset();
            if connection.phase != Connectivity::LinkDown {
                return;
            }
            connection.phase = Connectivity::SessionDown;
            connection.session_backoff.reset();
        }
        tracing::info!("Link up");
        self.start_session();
    }

    fn on_link_down(&self) {
        {
            let mut connection = self.connection.lock();
            if connection.phase == Connectivity::LinkDown {
                return;
            }
            connection.phase = Connectivity::LinkDown;
            connection.session_active = false;
            connection.pending_subscriptions.clear();
            connection.session_backoff.reset();
            connection.link_backoff.reset();
            connection.link_backoff.schedule(Instant::now());
        }
        tracing::warn!("Link down, reconnecting");
        self.session.stop();
        self.engine.set_connected(false);
        self.connect_link();
    }

    fn on_session_up(&self) {
        {
            let mut connection = self.connection.lock();
            connection.phase = Connectivity::SessionUp;
            connection.session_backoff.reset();
        }
        tracing::info!("Session established");
        self.engine.set_connected(true);
        self.resubscribe_all();
    }

    fn on_session_down(&self) {
        let (was_up, retry_in) = {
            let mut connection = self.connection.lock();
            connection.session_active = false;
            connection.pending_subscriptions.clear();
            let was_up = connection.phase == Connectivity::SessionUp;
            if was_up {
                connection.phase = Connectivity::SessionDown;
                connection.session_backoff.reset();
            }
            connection.session_backoff.schedule(Instant::now());
            (was_up, connection.session_backoff.interval())
        };

        self.session.stop();
        if was_up {
            tracing::warn!(retry_in_ms = retry_in.as_millis(), "Session lost");
        } else {
            tracing::debug!(retry_in_ms = retry_in.as_millis(), "Session attempt failed");
        }
        self.engine.set_connected(false);
    }

    fn on_message(&self, topic: &str, payload: &[u8]) {
        let (topic, topic_cut) = decode_bounded(topic.as_bytes(), RAW_TOPIC_LEN);
        let (payload, payload_cut) = decode_bounded(payload, RAW_PAYLOAD_LEN);
        tracing::debug!(
            topic = %topic,
            truncated = topic_cut || payload_cut,
            "Message received"
        );

        let _guard = self.lock.enter();
        let matched = self.engine.apply_message(&topic, &payload);
        let captured = self.settings.lock().resolver.capture(&topic, &payload);
        tracing::trace!(topic = %topic, matched, captured, "Message processed");
    }

    fn on_tick(&self) {
        let now = Instant::now();
        let retry = {
            let mut connection = self.connection.lock();
            if !connection.is_running() {
                return;
            }
            match connection.phase {
                Connectivity::SessionUp if !connection.pending_subscriptions.is_empty() => {
                    Some(Retry::Subscriptions(std::mem::take(
                        &mut connection.pending_subscriptions,
                    )))
                }
                Connectivity::LinkDown if connection.link_backoff.is_due(now) => {
                    connection.link_backoff.escalate();
                    connection.link_backoff.schedule(now);
                    Some(Retry::Link)
                }
                Connectivity::SessionDown
                    if !connection.session_active && connection.session_backoff.is_due(now) =>
                {
                    connection.session_backoff.escalate();
                    Some(Retry::Session)
                }
                _ => None,
            }
        };

        match retry {
            Some(Retry::Link) => {
                tracing::info!("Retrying link");
                self.connect_link();
            }
            Some(Retry::Session) => {
                tracing::info!(
                    next_interval_ms = self.reconnect_interval().as_millis(),
                    "Retrying session"
                );
                self.start_session();
            }
            Some(Retry::Subscriptions(topics)) => {
                tracing::debug!(count = topics.len(), "Retrying subscriptions");
                self.subscribe_all(topics);
            }
            None => {}
        }
    }

    // =========================================================================
    // Collaborator calls
    // =========================================================================

    fn connect_link(&self) {
        let prepared = {
            let connection = self.connection.lock();
            connection.events.as_ref().map(|queue| {
                (
                    connection.credentials.clone(),
                    queue.sink(connection.run_generation),
                )
            })
        };
        let Some((credentials, sink)) = prepared else {
            return;
        };

        tracing::debug!(ssid = %credentials.ssid, "Connecting link");
        if let Err(e) = self.link.connect(&credentials, sink) {
            tracing::warn!(error = %e, "Link connect failed");
        }
    }

    fn start_session(&self) {
        let (keep_alive, last_will) = {
            let settings = self.settings.lock();
            (settings.keep_alive, settings.last_will.clone())
        };

        let prepared = {
            let mut connection = self.connection.lock();
            match connection.events.clone() {
                Some(queue) if connection.phase == Connectivity::SessionDown => {
                    let generation = connection.issue_generation();
                    connection.session_generation = generation;
                    connection.session_active = true;
                    connection.session_backoff.disarm();
                    let config = SessionConfig {
                        endpoint: connection.endpoint.clone(),
                        client_id: connection.client_id.clone(),
                        keep_alive,
                        last_will,
                    };
                    Some((config, queue.sink(generation), generation))
                }
                _ => None,
            }
        };
        let Some((config, sink, generation)) = prepared else {
            return;
        };

        tracing::info!(endpoint = %config.endpoint, "Starting session");
        if let Err(e) = self.session.start(&config, sink) {
            tracing::warn!(error = %e, "Session start failed");
            let mut connection = self.connection.lock();
            if connection.session_generation == generation {
                connection.session_active = false;
                connection.session_backoff.schedule(Instant::now());
            }
        }
    }

    /// Subscribes every rule topic, then every uncovered raw topic.
    fn resubscribe_all(&self) {
        let rule_topics = self.engine.rule_topics();
        let plan = self
            .settings
            .lock()
            .resolver
            .subscription_plan(rule_topics.iter().map(String::as_str));

        self.subscribe_all(plan);
    }

    /// Subscribes each topic in order. Failures are kept for the next tick.
    fn subscribe_all(&self, topics: Vec<(String, Qos)>) {
        let mut failed = Vec::new();
        for (topic, qos) in topics {
            tracing::debug!(topic = %topic, qos = %qos, "Subscribing");
            if let Err(e) = self.session.subscribe(&topic, qos) {
                tracing::warn!(topic = %topic, error = %e, "Subscribe failed, will retry");
                failed.push((topic, qos));
            }
        }
        self.defer_subscriptions(failed);
    }

    fn defer_subscriptions(&self, failed: Vec<(String, Qos)>) {
        if failed.is_empty() {
            return;
        }
        let mut connection = self.connection.lock();
        if connection.phase != Connectivity::SessionUp {
            return;
        }
        for entry in failed {
            if !connection
                .pending_subscriptions
                .iter()
                .any(|(topic, _)| *topic == entry.0)
            {
                connection.pending_subscriptions.push(entry);
            }
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Runs telemetry, then the application observer.
    fn dispatch(&self, change: &StateChange) {
        self.publish_state(change);

        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer(change);
        }
    }

    fn publish_state(&self, change: &StateChange) {
        if self.connectivity() != Connectivity::SessionUp {
            return;
        }
        let Some(pending) = self.telemetry.lock().advance(change) else {
            return;
        };

        let report = StateReport {
            prev: self.engine.state_name(pending.prev),
            curr: self.engine.state_name(pending.curr),
            uptime_ms: self.uptime_ms(),
        };
        let qos = pending
            .target
            .qos
            .unwrap_or_else(|| self.settings.lock().publish_qos);

        let payload = match serde_json::to_vec(&report) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode state report");
                return;
            }
        };

        tracing::debug!(
            topic = %pending.target.topic,
            prev = %report.prev,
            curr = %report.curr,
            "Publishing state report"
        );
        if let Err(e) = self
            .session
            .publish(&pending.target.topic, &payload, qos, pending.target.retain)
        {
            tracing::warn!(error = %e, "State report publish failed");
        }
    }

    pub(crate) fn set_observer(&self, observer: Option<StateObserver>) {
        *self.observer.lock() = observer;
    }

    // =========================================================================
    // Application operations
    // =========================================================================

    pub(crate) fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: Option<Qos>,
        retain: bool,
    ) -> bool {
        if topic.is_empty() || self.connectivity() != Connectivity::SessionUp {
            return false;
        }
        let qos = qos.unwrap_or_else(|| self.settings.lock().publish_qos);
        match self.session.publish(topic, payload, qos, retain) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(topic = %topic, error = %e, "Publish failed");
                false
            }
        }
    }

    pub(crate) fn subscribe_raw(&self, topic: &str, qos: Qos) -> bool {
        let _guard = self.lock.enter();
        if !self.settings.lock().resolver.subscribe_raw(topic, qos) {
            return false;
        }
        if self.connectivity() == Connectivity::SessionUp {
            self.subscribe_all(vec![(topic.to_string(), qos)]);
        }
        true
    }

    pub(crate) fn pull_raw(&self, topic: &str) -> Option<String> {
        let _guard = self.lock.enter();
        self.settings.lock().resolver.pull_raw(topic)
    }

    pub(crate) fn set_default_subscribe_qos(&self, qos: Qos) {
        self.settings.lock().resolver.set_default_qos(qos);
    }

    pub(crate) fn set_default_publish_qos(&self, qos: Qos) {
        self.settings.lock().publish_qos = qos;
    }

    pub(crate) fn set_qos_for_topic(&self, topic: &str, qos: Qos) -> bool {
        self.settings.lock().resolver.set_qos_for_topic(topic, qos)
    }

    pub(crate) fn resolve_qos(&self, topic: &str) -> Qos {
        self.settings.lock().resolver.resolve_qos(topic)
    }

    pub(crate) fn set_keep_alive(&self, keep_alive: Duration) {
        self.settings.lock().keep_alive = keep_alive;
    }

    pub(crate) fn set_last_will(&self, will: Option<LastWill>) {
        self.settings.lock().last_will = will;
    }

    pub(crate) fn last_will(&self) -> Option<LastWill> {
        self.settings.lock().last_will.clone()
    }

    pub(crate) fn enable_state_telemetry(
        &self,
        topic: &str,
        qos: Option<Qos>,
        retain: bool,
    ) -> bool {
        self.telemetry.lock().enable(topic, qos, retain)
    }

    pub(crate) fn disable_state_telemetry(&self) {
        self.telemetry.lock().disable();
    }

    pub(crate) fn state_telemetry_enabled(&self) -> bool {
        self.telemetry.lock().is_enabled()
    }

    pub(crate) fn set_task_enabled(&self, id: TaskId, enabled: bool) -> bool {
        if !self.engine.set_task_enabled(id, enabled) {
            return false;
        }
        if let Some(handles) = self.handles.lock().as_ref() {
            handles.scheduler.set_enabled(id, enabled);
        }
        true
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub(crate) fn connectivity(&self) -> Connectivity {
        self.connection.lock().phase
    }

    /// Interval the next session retry will wait.
    pub(crate) fn reconnect_interval(&self) -> Duration {
        self.connection.lock().session_backoff.interval()
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started_at.lock().elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(handles) = self.handles.get_mut().take() {
            handles.driver.abort();
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("connectivity", &self.connectivity())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::protocol::EventSink;

    #[derive(Default)]
    struct NullLink;

    impl Link for NullLink {
        fn connect(&self, _: &LinkCredentials, _: EventSink) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn disconnect(&self) {}
        fn is_up(&self) -> bool {
            false
        }
    }

    #[derive(Default)]
    struct CountingSession {
        starts: Mutex<Vec<EventSink>>,
        subscriptions: Mutex<Vec<(String, Qos)>>,
        // Refuse subscriptions once this many were accepted.
        queue_limit: Mutex<Option<usize>>,
    }

    impl Session for CountingSession {
        fn start(&self, _: &SessionConfig, events: EventSink) -> Result<(), ProtocolError> {
            self.starts.lock().push(events);
            Ok(())
        }
        fn stop(&self) {}
        fn publish(&self, _: &str, _: &[u8], _: Qos, _: bool) -> Result<(), ProtocolError> {
            Ok(())
        }
        fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ProtocolError> {
            let mut subscriptions = self.subscriptions.lock();
            if self
                .queue_limit
                .lock()
                .is_some_and(|limit| subscriptions.len() >= limit)
            {
                return Err(ProtocolError::NotConnected);
            }
            subscriptions.push((topic.to_string(), qos));
            Ok(())
        }
    }

    fn supervisor() -> (Arc<Supervisor>, Arc<CountingSession>) {
        let session = Arc::new(CountingSession::default());
        let supervisor = Supervisor::new(
            Arc::new(StateEngine::new()),
            Arc::new(NullLink),
            session.clone(),
        );
        (supervisor, session)
    }

    fn link_up(supervisor: &Supervisor) {
        let generation = supervisor.connection.lock().run_generation;
        supervisor.handle_event(ConnectivityEvent::Link {
            generation,
            event: LinkEvent::GotAddress,
        });
    }

    #[tokio::test]
    async fn link_up_starts_session() {
        let (supervisor, session) = supervisor();
        supervisor.prepare(&NodeConfig::new("s", "", "b"));

        link_up(&supervisor);

        assert_eq!(supervisor.connectivity(), Connectivity::SessionDown);
        assert_eq!(session.starts.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn events_from_superseded_attempts_are_ignored() {
        let (supervisor, session) = supervisor();
        supervisor.prepare(&NodeConfig::new("s", "", "b"));
        link_up(&supervisor);

        let stale = session.starts.lock()[0].clone();
        let generation = supervisor.connection.lock().session_generation;
        supervisor.handle_event(ConnectivityEvent::Session {
            generation,
            event: SessionEvent::Disconnected,
        });
        // A new attempt supersedes the first.
        tokio::time::advance(Duration::from_secs(3)).await;
        supervisor.on_tick();
        assert_eq!(session.starts.lock().len(), 2);

        let current = session.starts.lock()[1].clone();
        assert_ne!(stale.generation(), current.generation());
        supervisor.handle_event(ConnectivityEvent::Session {
            generation: stale.generation(),
            event: SessionEvent::Connected,
        });
        assert_eq!(supervisor.connectivity(), Connectivity::SessionDown);
        assert!(!supervisor.engine().is_connected());
    }

    fn session_up(supervisor: &Supervisor) {
        let generation = supervisor.connection.lock().session_generation;
        supervisor.handle_event(ConnectivityEvent::Session {
            generation,
            event: SessionEvent::Connected,
        });
    }

    #[tokio::test]
    async fn refused_subscriptions_are_retried_on_tick() {
        let (supervisor, session) = supervisor();
        for i in 0..20 {
            supervisor
                .engine()
                .declare_state_rule(&format!("rule/{i}"), "on", "ON");
        }
        *session.queue_limit.lock() = Some(10);
        supervisor.prepare(&NodeConfig::new("s", "", "b"));
        link_up(&supervisor);
        session_up(&supervisor);

        assert_eq!(session.subscriptions.lock().len(), 10);
        assert_eq!(supervisor.connection.lock().pending_subscriptions.len(), 10);

        // Still refused: nothing is lost or duplicated.
        supervisor.on_tick();
        assert_eq!(supervisor.connection.lock().pending_subscriptions.len(), 10);

        *session.queue_limit.lock() = None;
        supervisor.on_tick();

        let topics: Vec<_> = session
            .subscriptions
            .lock()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect();
        let expected: Vec<_> = (0..20).map(|i| format!("rule/{i}")).collect();
        assert_eq!(topics, expected);
        assert!(supervisor.connection.lock().pending_subscriptions.is_empty());
    }

    #[tokio::test]
    async fn pending_subscriptions_are_dropped_with_the_session() {
        let (supervisor, session) = supervisor();
        supervisor.engine().declare_state_rule("rule/a", "on", "ON");
        *session.queue_limit.lock() = Some(0);
        supervisor.prepare(&NodeConfig::new("s", "", "b"));
        link_up(&supervisor);
        session_up(&supervisor);
        assert_eq!(supervisor.connection.lock().pending_subscriptions.len(), 1);

        let generation = supervisor.connection.lock().session_generation;
        supervisor.handle_event(ConnectivityEvent::Session {
            generation,
            event: SessionEvent::Disconnected,
        });
        assert!(supervisor.connection.lock().pending_subscriptions.is_empty());
    }

    #[tokio::test]
    async fn events_before_start_are_ignored() {
        let (supervisor, _) = supervisor();
        supervisor.handle_event(ConnectivityEvent::Link {
            generation: 0,
            event: LinkEvent::GotAddress,
        });
        assert_eq!(supervisor.connectivity(), Connectivity::LinkDown);
    }

    #[tokio::test]
    async fn oversized_messages_are_truncated_not_dropped() {
        let (supervisor, _) = supervisor();
        supervisor.prepare(&NodeConfig::new("s", "", "b"));
        link_up(&supervisor);

        let topic = "t".repeat(RAW_TOPIC_LEN);
        supervisor.subscribe_raw(&topic, Qos::AtMostOnce);
        let generation = supervisor.connection.lock().session_generation;
        supervisor.handle_event(ConnectivityEvent::Session {
            generation,
            event: SessionEvent::Message {
                topic: format!("{topic}/overflow"),
                payload: vec![b'x'; 1000],
            },
        });

        let payload = supervisor.pull_raw(&topic).unwrap();
        assert_eq!(payload.len(), RAW_PAYLOAD_LEN);
    }
}
