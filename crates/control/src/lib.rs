// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Per-site control channel used by external callers to drive a session.
//!
//! Every site has one topic. Callers publish `advance` to request one step and `stop` to end the
//! session; the session publishes `complete` after every step and sets the control state of the
//! site back to `idle`.

mod memory;

use std::future::Future;
use std::time::Duration;

use cosim_types::errors::GenericError;
use cosim_types::identifiers::SiteId;

pub use memory::{MemoryControlHub, MemorySubscription};

/// Messages exchanged on the topic of a site.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ControlMessage {
    /// Request one step.
    Advance,
    /// Request the session to end.
    Stop,
    /// Published by the session once a requested step was performed.
    Complete,
}

/// Control state of a site, kept next to its topic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ControlState {
    /// No step is in progress.
    Idle,
    /// A caller requested a step that was not performed yet.
    Advance,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("control channel is closed")]
    Closed,
    #[error("control channel is unavailable: {0}")]
    Unavailable(#[source] GenericError),
}

pub trait ControlChannel: Send + Sync + 'static {
    type Subscription: ControlSubscription;

    /// Subscribes to the topic of `site`. Only messages published after the subscription are
    /// received.
    fn subscribe(
        &self,
        site: &SiteId,
    ) -> impl Future<Output = Result<Self::Subscription, ChannelError>> + Send;

    fn publish(
        &self,
        site: &SiteId,
        message: ControlMessage,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;

    fn set_control_state(
        &self,
        site: &SiteId,
        state: ControlState,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

pub trait ControlSubscription: Send + 'static {
    /// Waits up to `timeout` for the next message of the topic. Returns `None` when no message
    /// arrived in time. Payloads that are not a [`ControlMessage`] are logged and skipped.
    fn next_message(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<ControlMessage>, ChannelError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads() {
        assert_eq!(ControlMessage::Advance.to_string(), "advance");
        assert_eq!("stop".parse::<ControlMessage>().unwrap(), ControlMessage::Stop);
        assert_eq!(
            "complete".parse::<ControlMessage>().unwrap(),
            ControlMessage::Complete
        );
        assert!("Advance".parse::<ControlMessage>().is_err());
        assert_eq!(ControlState::Idle.as_ref(), "idle");
    }
}
