// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Stepping engine of a co-simulation session.
//!
//! A [`StepDriver`] owns one session: it launches the engine, performs one step for every
//! `advance` signal received on the control channel of its site, keeps the shared state store in
//! sync with the engine inputs and outputs, and archives the session artifacts once it stops.

mod clock;
mod driver;
mod finalizer;
mod live_state;
mod metric_definitions;
mod session;

pub use clock::{ClockReconciler, DataResolutionError, expected_datetime, rollover};
pub use driver::{SessionContext, SessionResources, SessionSummary, StepDriver, StopReason};
pub use finalizer::{PersistenceError, SessionFinalizer};
pub use live_state::{LiveStateSync, apply_overrides};
pub use metric_definitions::*;
pub use session::{Session, SessionStatus};

use cosim_channel::{HandshakeError, StartError};
use cosim_control::ChannelError;

/// Failure before the first step. No shared state was written.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("cannot subscribe to the control channel: {0}")]
    Subscribe(#[source] ChannelError),
    #[error(transparent)]
    Start(#[from] StartError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session startup failed: {0}")]
    Startup(#[from] StartupError),
    #[error("session finalization failed: {0}")]
    Persistence(#[from] PersistenceError),
}
