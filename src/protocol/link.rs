// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Always-available link for hosted targets.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ProtocolError;

use super::{EventSink, Link, LinkCredentials};

/// A [`Link`] for targets whose network is managed by the host.
///
/// Connecting reports an address immediately; credentials are ignored.
#[derive(Debug, Default)]
pub struct HostLink {
    up: AtomicBool,
}

impl HostLink {
    /// Creates a link that is down until connected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Link for HostLink {
    fn connect(
        &self,
        credentials: &LinkCredentials,
        events: EventSink,
    ) -> Result<(), ProtocolError> {
        tracing::debug!(ssid = %credentials.ssid, "Host link up");
        self.up.store(true, Ordering::Release);
        events.link_up();
        Ok(())
    }

    fn disconnect(&self) {
        self.up.store(false, Ordering::Release);
    }

    fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ConnectivityEvent, LinkEvent, event_queue};

    #[test]
    fn connect_reports_address() {
        let (queue, mut rx) = event_queue();
        let link = HostLink::new();
        assert!(!link.is_up());

        link.connect(&LinkCredentials::default(), queue.sink(1))
            .unwrap();

        assert!(link.is_up());
        assert_eq!(
            rx.try_recv().unwrap(),
            ConnectivityEvent::Link {
                generation: 1,
                event: LinkEvent::GotAddress
            }
        );

        link.disconnect();
        assert!(!link.is_up());
    }
}
