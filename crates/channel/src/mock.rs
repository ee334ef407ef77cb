// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{CoSimClient, HandshakeError, ProtocolError, StartError};

type OutputFn = dyn Fn(u64, &[f64]) -> Vec<f64> + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStep {
    pub inputs: Vec<f64>,
    pub elapsed_seconds: f64,
}

struct State {
    running: bool,
    connected: bool,
    fail_start: bool,
    fail_handshake: bool,
    exit_after_steps: Option<usize>,
    failures: VecDeque<(usize, i32)>,
    steps: Vec<RecordedStep>,
    stops: Vec<bool>,
}

/// In-memory engine. Outputs are computed by a function of the 1-based step number and the
/// step inputs. Clones share their state, so a test keeps a clone to inspect the calls.
#[derive(Clone)]
pub struct MockClient {
    outputs: Arc<OutputFn>,
    state: Arc<Mutex<State>>,
}

impl MockClient {
    pub fn new(outputs: impl Fn(u64, &[f64]) -> Vec<f64> + Send + Sync + 'static) -> Self {
        Self {
            outputs: Arc::new(outputs),
            state: Arc::new(Mutex::new(State {
                running: false,
                connected: false,
                fail_start: false,
                fail_handshake: false,
                exit_after_steps: None,
                failures: VecDeque::new(),
                steps: Vec::new(),
                stops: Vec::new(),
            })),
        }
    }

    pub fn fail_start(self) -> Self {
        self.state.lock().fail_start = true;
        self
    }

    pub fn fail_handshake(self) -> Self {
        self.state.lock().fail_handshake = true;
        self
    }

    /// The process exits once the given number of steps completed.
    pub fn exit_after_steps(self, steps: usize) -> Self {
        self.state.lock().exit_after_steps = Some(steps);
        self
    }

    /// The `nth` step (1-based) answers with the given non-zero status.
    pub fn fail_step(self, nth: usize, flag: i32) -> Self {
        self.state.lock().failures.push_back((nth, flag));
        self
    }

    pub fn steps(&self) -> Vec<RecordedStep> {
        self.state.lock().steps.clone()
    }

    /// The `force` argument of every `stop` call.
    pub fn stops(&self) -> Vec<bool> {
        self.state.lock().stops.clone()
    }

    pub fn running(&self) -> bool {
        self.state.lock().running
    }
}

impl CoSimClient for MockClient {
    async fn start(&mut self) -> Result<(), StartError> {
        let mut state = self.state.lock();
        if state.running {
            return Err(StartError::AlreadyStarted);
        }
        if state.fail_start {
            return Err(StartError::Spawn {
                program: "mock-engine".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "mock start failure"),
            });
        }
        state.running = true;
        Ok(())
    }

    async fn handshake(&mut self, timeout: Duration) -> Result<(), HandshakeError> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(HandshakeError::NotStarted);
        }
        if state.fail_handshake {
            return Err(HandshakeError::Timeout(timeout));
        }
        state.connected = true;
        Ok(())
    }

    async fn step(
        &mut self,
        inputs: &[f64],
        elapsed_seconds: f64,
    ) -> Result<Vec<f64>, ProtocolError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ProtocolError::NotConnected);
        }
        state.steps.push(RecordedStep {
            inputs: inputs.to_vec(),
            elapsed_seconds,
        });
        let nth = state.steps.len();

        if let Some(pos) = state.failures.iter().position(|(n, _)| *n == nth) {
            let (_, flag) = state.failures.remove(pos).expect("position is in range");
            state.running = false;
            state.connected = false;
            return Err(ProtocolError::Status(flag));
        }
        if state.exit_after_steps.is_some_and(|n| nth >= n) {
            state.running = false;
        }

        Ok((self.outputs)(nth as u64, inputs))
    }

    async fn stop(&mut self, force: bool) {
        let mut state = self.state.lock();
        state.stops.push(force);
        state.running = false;
        state.connected = false;
    }

    fn is_running(&mut self) -> bool {
        self.state.lock().running
    }
}
