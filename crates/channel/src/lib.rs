// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lifecycle and lock-step exchange with the external co-simulation engine.
//!
//! The worker talks to the engine through [`CoSimClient`]. A step is a single request/response
//! exchange: the inputs of the step are written, then the call blocks until the engine answers
//! with the outputs at the end of the step. Steps are never retried, the engine is stateful.

mod codec;
#[cfg(any(test, feature = "test-util"))]
mod mock;
mod process;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

pub use codec::{CodecError, Packet, PacketCodec, SocketConfig};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClient, RecordedStep};
pub use process::ProcessClient;

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("cannot bind the engine listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("cannot write the engine socket configuration '{}': {source}", path.display())]
    SocketConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot launch engine '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("engine was already started")]
    AlreadyStarted,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("engine did not connect within {0:?}")]
    Timeout(Duration),
    #[error("cannot accept the engine connection: {0}")]
    Accept(#[source] std::io::Error),
    #[error("engine was not started")]
    NotStarted,
}

/// Failure of a step. Every variant is fatal for the session.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("engine reported status {0}")]
    Status(i32),
    #[error("engine closed the connection")]
    Closed,
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("engine is not connected")]
    NotConnected,
}

/// Client of an external co-simulation engine.
pub trait CoSimClient: Send {
    /// Launches the engine.
    fn start(&mut self) -> impl Future<Output = Result<(), StartError>> + Send;

    /// Waits for the launched engine to connect, bounded by `timeout`.
    fn handshake(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), HandshakeError>> + Send;

    /// Performs one step. `inputs` is tagged with the simulated time elapsed since the session
    /// start, in seconds. Returns the outputs reported by the engine at the end of the step.
    fn step(
        &mut self,
        inputs: &[f64],
        elapsed_seconds: f64,
    ) -> impl Future<Output = Result<Vec<f64>, ProtocolError>> + Send;

    /// Stops the engine. With `force` the process is killed without asking it to terminate.
    /// Calling `stop` on a stopped client is a no-op.
    fn stop(&mut self, force: bool) -> impl Future<Output = ()> + Send;

    /// Whether the engine process is still alive.
    fn is_running(&mut self) -> bool;
}
