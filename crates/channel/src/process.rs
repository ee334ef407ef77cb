// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use cosim_types::config::CoSimOptions;

use crate::{
    CoSimClient, CodecError, HandshakeError, PacketCodec, ProtocolError, SocketConfig, StartError,
};

/// Runs the engine as a child process connected back to the worker over TCP.
///
/// The listener is bound before the engine is launched so that the socket configuration handed
/// to the engine always points to a live address.
pub struct ProcessClient<C> {
    options: CoSimOptions,
    codec: C,
    work_dir: PathBuf,
    model_args: Vec<OsString>,
    listener: Option<TcpListener>,
    child: Option<Child>,
    connection: Option<Framed<TcpStream, LinesCodec>>,
}

impl<C: PacketCodec> ProcessClient<C> {
    pub fn new(options: CoSimOptions, codec: C, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            options,
            codec,
            work_dir: work_dir.into(),
            model_args: Vec::new(),
            listener: None,
            child: None,
            connection: None,
        }
    }

    /// Model specific arguments, appended after the configured engine arguments.
    pub fn with_model_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.model_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Address the engine is expected to connect to, available between start and handshake.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }
}

fn lines_error(err: LinesCodecError) -> ProtocolError {
    match err {
        LinesCodecError::Io(err) => ProtocolError::Transport(err),
        LinesCodecError::MaxLineLengthExceeded => {
            ProtocolError::Codec(CodecError::new("maximum line length exceeded"))
        }
    }
}

impl<C: PacketCodec> CoSimClient for ProcessClient<C> {
    async fn start(&mut self) -> Result<(), StartError> {
        if self.child.is_some() {
            return Err(StartError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.options.bind_address)
            .await
            .map_err(StartError::Bind)?;
        let addr = listener.local_addr().map_err(StartError::Bind)?;

        if let Some(SocketConfig {
            file_name,
            contents,
        }) = self.codec.socket_config(addr)
        {
            let path = self.work_dir.join(file_name);
            if let Err(source) = tokio::fs::write(&path, contents).await {
                return Err(StartError::SocketConfig { path, source });
            }
        }

        let child = Command::new(&self.options.program)
            .args(&self.options.args)
            .args(&self.model_args)
            .envs(&self.options.env)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartError::Spawn {
                program: self.options.program.clone(),
                source,
            })?;

        info!(
            pid = ?child.id(),
            %addr,
            "Launched engine {}",
            self.options.program.display()
        );
        self.listener = Some(listener);
        self.child = Some(child);
        Ok(())
    }

    async fn handshake(&mut self, timeout: Duration) -> Result<(), HandshakeError> {
        let listener = self.listener.as_ref().ok_or(HandshakeError::NotStarted)?;

        let (stream, peer) = tokio::time::timeout(timeout, listener.accept())
            .await
            .map_err(|_| HandshakeError::Timeout(timeout))?
            .map_err(HandshakeError::Accept)?;
        if let Err(err) = stream.set_nodelay(true) {
            debug!("Cannot disable Nagle on the engine connection: {err}");
        }
        debug!(%peer, "Engine connected");

        self.connection = Some(Framed::new(stream, LinesCodec::new()));
        // a single engine connects per session
        self.listener = None;
        Ok(())
    }

    async fn step(
        &mut self,
        inputs: &[f64],
        elapsed_seconds: f64,
    ) -> Result<Vec<f64>, ProtocolError> {
        let connection = self.connection.as_mut().ok_or(ProtocolError::NotConnected)?;

        let request = self.codec.encode_step(elapsed_seconds, inputs);
        connection.send(request).await.map_err(lines_error)?;

        let frame = match connection.next().await {
            Some(frame) => frame.map_err(lines_error)?,
            None => return Err(ProtocolError::Closed),
        };
        let packet = self.codec.decode(&frame)?;
        if packet.flag != 0 {
            return Err(ProtocolError::Status(packet.flag));
        }
        Ok(packet.values)
    }

    async fn stop(&mut self, force: bool) {
        self.listener = None;
        let connection = self.connection.take();
        let Some(mut child) = self.child.take() else {
            return;
        };

        if !force {
            if let Some(mut connection) = connection {
                if let Err(err) = connection.send(self.codec.encode_stop()).await {
                    debug!("Cannot send the stop message to the engine: {err}");
                }
            }
            match tokio::time::timeout(self.options.stop_timeout(), child.wait()).await {
                Ok(Ok(status)) => {
                    info!(%status, "Engine exited");
                    return;
                }
                Ok(Err(err)) => warn!("Cannot wait for the engine to exit: {err}"),
                Err(_) => warn!(
                    "Engine did not exit within {:?}, killing it",
                    self.options.stop_timeout()
                ),
            }
        }

        match child.kill().await {
            Ok(()) => info!("Engine killed"),
            Err(err) => warn!("Cannot kill the engine: {err}"),
        }
    }

    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "Engine exited");
                false
            }
            Err(err) => {
                warn!("Cannot query the engine process: {err}");
                false
            }
        }
    }
}
