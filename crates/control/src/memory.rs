// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use cosim_types::identifiers::SiteId;

use crate::{ChannelError, ControlChannel, ControlMessage, ControlState, ControlSubscription};

const TOPIC_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    topics: HashMap<SiteId, broadcast::Sender<String>>,
    states: HashMap<SiteId, ControlState>,
}

impl Inner {
    fn topic(&mut self, site: &SiteId) -> &broadcast::Sender<String> {
        self.topics
            .entry(site.clone())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
    }
}

/// In-process control channel. Clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryControlHub {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryControlHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a raw text payload on the topic of `site`. Returns the number of subscribers
    /// the payload was delivered to.
    pub fn publish_raw(&self, site: &SiteId, payload: impl Into<String>) -> usize {
        // no subscriber is not an error, the payload is dropped like on any pub/sub topic
        self.inner
            .lock()
            .topic(site)
            .send(payload.into())
            .unwrap_or_default()
    }

    /// Number of live subscriptions to the topic of `site`.
    pub fn subscriber_count(&self, site: &SiteId) -> usize {
        self.inner
            .lock()
            .topics
            .get(site)
            .map(|topic| topic.receiver_count())
            .unwrap_or_default()
    }

    pub fn control_state(&self, site: &SiteId) -> Option<ControlState> {
        self.inner.lock().states.get(site).copied()
    }
}

impl ControlChannel for MemoryControlHub {
    type Subscription = MemorySubscription;

    async fn subscribe(&self, site: &SiteId) -> Result<Self::Subscription, ChannelError> {
        let rx = self.inner.lock().topic(site).subscribe();
        debug!(%site, "Subscribed to control topic");
        Ok(MemorySubscription {
            site: site.clone(),
            rx,
        })
    }

    async fn publish(&self, site: &SiteId, message: ControlMessage) -> Result<(), ChannelError> {
        self.publish_raw(site, message.to_string());
        Ok(())
    }

    async fn set_control_state(
        &self,
        site: &SiteId,
        state: ControlState,
    ) -> Result<(), ChannelError> {
        self.inner.lock().states.insert(site.clone(), state);
        Ok(())
    }
}

pub struct MemorySubscription {
    site: SiteId,
    rx: broadcast::Receiver<String>,
}

impl ControlSubscription for MemorySubscription {
    async fn next_message(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<ControlMessage>, ChannelError> {
        let deadline = Instant::now() + timeout;
        loop {
            let payload = match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Ok(payload)) => payload,
                Ok(Err(RecvError::Lagged(skipped))) => {
                    warn!(site = %self.site, "Control subscription lagged, skipped {skipped} messages");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return Err(ChannelError::Closed),
            };

            match payload.parse() {
                Ok(message) => return Ok(Some(message)),
                Err(_) => warn!(site = %self.site, "Ignoring unknown control payload '{payload}'"),
            }
        }
    }
}
