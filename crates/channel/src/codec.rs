// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::net::SocketAddr;
use std::path::PathBuf;

/// A decoded engine message.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// `0` while the engine is stepping, anything else means it stopped or failed.
    pub flag: i32,
    /// Simulated time the packet refers to, in seconds.
    pub time: f64,
    pub values: Vec<f64>,
}

/// File the engine reads at launch to find the worker's listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketConfig {
    /// Path relative to the engine working directory.
    pub file_name: PathBuf,
    pub contents: String,
}

#[derive(Debug, thiserror::Error)]
#[error("cannot decode engine packet: {reason}")]
pub struct CodecError {
    reason: String,
}

impl CodecError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Encoding of the engine's co-simulation messages. Every message is a single line; the codec
/// works on the line content without the line terminator.
pub trait PacketCodec: Send + Sync + 'static {
    fn encode_step(&self, elapsed_seconds: f64, inputs: &[f64]) -> String;

    /// Message asking the engine to terminate.
    fn encode_stop(&self) -> String;

    fn decode(&self, frame: &str) -> Result<Packet, CodecError>;

    /// Configuration file pointing the engine to `addr`, if the engine needs one.
    fn socket_config(&self, _addr: SocketAddr) -> Option<SocketConfig> {
        None
    }
}
