// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use jiff::civil::DateTime;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use cosim_archive::ArchiveStorage;
use cosim_channel::{CoSimClient, ProtocolError};
use cosim_control::{
    ChannelError, ControlChannel, ControlMessage, ControlState, ControlSubscription,
};
use cosim_state_store::StateStore;
use cosim_types::config::{Configuration, StepperOptions};
use cosim_types::identifiers::SiteId;
use cosim_types::records::{SessionUpdate, SimStatus, SimulationRecord};
use cosim_variables::VariableIndex;

use crate::clock::ClockReconciler;
use crate::finalizer::SessionFinalizer;
use crate::live_state::LiveStateSync;
use crate::metric_definitions::{
    STEP_OUTCOME_FAILED, STEP_OUTCOME_OK, STEPPER_STEP_DURATION, STEPPER_STEPS, describe_metrics,
};
use crate::session::Session;
use crate::{SessionError, StartupError};

/// What a session runs on.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub site_id: SiteId,
    pub start: DateTime,
    pub end: DateTime,
    /// Engine working directory, archived when the session ends.
    pub work_dir: PathBuf,
}

/// Collaborators shared by all sessions of a worker.
pub struct SessionResources<S, H, A> {
    pub store: Arc<S>,
    pub control: Arc<H>,
    pub archive: Arc<A>,
}

impl<S, H, A> Clone for SessionResources<S, H, A> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            control: Arc::clone(&self.control),
            archive: Arc::clone(&self.archive),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop` received on the control channel.
    Requested,
    /// The session record was marked as stopping.
    StoreRequested,
    /// The worker is shutting down.
    Cancelled,
    EngineExited,
    /// The engine clock reached the session end.
    EndTimeReached,
    /// A step failed.
    StepFailed,
    ControlChannelClosed,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub site_id: SiteId,
    pub steps_completed: u64,
    /// Last engine time that could be resolved.
    pub last_datetime: Option<DateTime>,
    pub stop_reason: StopReason,
    pub simulation: SimulationRecord,
}

/// Drives one session from engine launch to finalization.
pub struct StepDriver<C, S, H, A> {
    session: Session,
    work_dir: PathBuf,
    options: StepperOptions,
    accept_timeout: std::time::Duration,
    client: C,
    index: VariableIndex,
    clock: ClockReconciler,
    live_state: LiveStateSync<S>,
    finalizer: SessionFinalizer<S, A>,
    resources: SessionResources<S, H, A>,
    last_datetime: Option<DateTime>,
}

impl<C, S, H, A> StepDriver<C, S, H, A>
where
    C: CoSimClient,
    S: StateStore,
    H: ControlChannel,
    A: ArchiveStorage,
{
    pub fn new(
        context: SessionContext,
        client: C,
        index: VariableIndex,
        resources: SessionResources<S, H, A>,
        config: &Configuration,
    ) -> Self {
        describe_metrics();

        let options = config.stepper.clone();
        let session = Session::new(
            context.site_id,
            context.start,
            context.end,
            options.master_enable_bypass,
        );
        let clock = ClockReconciler::new(&index, &options, context.start);
        let live_state = LiveStateSync::new(
            Arc::clone(&resources.store),
            session.site_id().clone(),
            &index,
        );
        let finalizer = SessionFinalizer::new(
            Arc::clone(&resources.store),
            Arc::clone(&resources.archive),
            config.archive.clone(),
        );

        Self {
            session,
            work_dir: context.work_dir,
            options,
            accept_timeout: config.cosim.accept_timeout(),
            client,
            index,
            clock,
            live_state,
            finalizer,
            resources,
            last_datetime: None,
        }
    }

    /// Runs the session to completion. Cancelling `cancellation` stops the session at the next
    /// poll tick, the session is finalized as if a stop was requested.
    pub async fn run(
        self,
        cancellation: CancellationToken,
    ) -> Result<SessionSummary, SessionError> {
        let span = info_span!("cosim_session", site_id = %self.session.site_id());
        self.run_inner(cancellation).instrument(span).await
    }

    async fn run_inner(
        mut self,
        cancellation: CancellationToken,
    ) -> Result<SessionSummary, SessionError> {
        let mut subscription = match self.initialize().await {
            Ok(subscription) => subscription,
            Err(err) => {
                error!("Session startup failed: {err}");
                self.client.stop(true).await;
                self.session.fail();
                return Err(err.into());
            }
        };
        self.session.started();
        info!(
            start = %self.session.start(),
            end = %self.session.end(),
            "Session started"
        );

        let stop_reason = self.step_loop(&mut subscription, &cancellation).await;
        drop(subscription);
        info!(?stop_reason, step = self.session.step(), "Session stopping");

        let site_id = self.session.site_id().clone();
        match self
            .finalizer
            .finalize(&mut self.client, &site_id, &self.work_dir)
            .await
        {
            Ok(simulation) => {
                self.session.finalized();
                info!(simulation_id = %simulation.id, "Session stopped");
                Ok(SessionSummary {
                    site_id,
                    steps_completed: self.session.step() - 1,
                    last_datetime: self.last_datetime,
                    stop_reason,
                    simulation,
                })
            }
            Err(err) => {
                error!("Session finalization failed: {err}");
                self.session.fail();
                Err(err.into())
            }
        }
    }

    async fn initialize(&mut self) -> Result<H::Subscription, StartupError> {
        // subscribe first, an advance sent while the engine boots is kept
        let subscription = self
            .resources
            .control
            .subscribe(self.session.site_id())
            .await
            .map_err(StartupError::Subscribe)?;
        self.client.start().await?;
        self.client.handshake(self.accept_timeout).await?;
        debug!("Engine connected");
        Ok(subscription)
    }

    async fn step_loop(
        &mut self,
        subscription: &mut H::Subscription,
        cancellation: &CancellationToken,
    ) -> StopReason {
        let poll_interval = self.options.poll_interval();
        loop {
            let message = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    self.session.stop();
                    return StopReason::Cancelled;
                }
                message = subscription.next_message(poll_interval) => message,
            };

            match message {
                Ok(Some(ControlMessage::Stop)) => {
                    self.session.stop();
                    return StopReason::Requested;
                }
                Ok(Some(ControlMessage::Advance)) => self.session.request_advance(),
                Ok(Some(ControlMessage::Complete)) | Ok(None) => {}
                Err(ChannelError::Closed) => {
                    warn!("Control channel closed");
                    self.session.stop();
                    return StopReason::ControlChannelClosed;
                }
                Err(err) => {
                    warn!("Cannot read the control channel: {err}");
                    tokio::time::sleep(poll_interval).await;
                }
            }

            if self.session.advance_requested() {
                if let Err(err) = self.step_once().await {
                    error!(step = self.session.step(), "Step failed: {err}");
                    self.session.stop();
                    return StopReason::StepFailed;
                }
                self.notify_step_completed().await;
            }

            if let Some(reason) = self.stop_condition().await {
                self.session.stop();
                return reason;
            }
        }
    }

    async fn step_once(&mut self) -> Result<(), ProtocolError> {
        self.session.begin_step();
        let step = self.session.step();
        let elapsed_seconds = (step - 1) as f64 * self.options.step_duration().as_secs_f64();

        let inputs = self
            .live_state
            .prepare_inputs(&self.index, self.session.master_enable_bypass())
            .await;
        let started = Instant::now();
        let result = self.client.step(inputs, elapsed_seconds).await;
        histogram!(STEPPER_STEP_DURATION).record(started.elapsed().as_secs_f64());

        let outputs = match result {
            Ok(outputs) => {
                counter!(STEPPER_STEPS, "outcome" => STEP_OUTCOME_OK).increment(1);
                outputs
            }
            Err(err) => {
                counter!(STEPPER_STEPS, "outcome" => STEP_OUTCOME_FAILED).increment(1);
                return Err(err);
            }
        };

        let next_step = self.session.complete_step();
        let datetime = match self.clock.reconcile(next_step, &outputs) {
            Ok(datetime) => Some(datetime),
            Err(err) => {
                warn!(step = next_step, "Cannot resolve the engine clock: {err}");
                None
            }
        };
        if datetime.is_some() {
            self.last_datetime = datetime;
        }

        self.live_state
            .publish(
                &self.index,
                &outputs,
                SessionUpdate {
                    datetime,
                    step: next_step,
                    status: SimStatus::Running,
                },
            )
            .await;
        debug!(step = next_step, ?datetime, "Step completed");
        Ok(())
    }

    async fn notify_step_completed(&mut self) {
        let site_id = self.session.site_id();
        let control = &self.resources.control;
        if let Err(err) = control.publish(site_id, ControlMessage::Complete).await {
            warn!("Cannot publish step completion: {err}");
        }
        if let Err(err) = control.set_control_state(site_id, ControlState::Idle).await {
            warn!("Cannot reset the control state: {err}");
        }
    }

    async fn stop_condition(&mut self) -> Option<StopReason> {
        if !self.client.is_running() {
            warn!("Engine is no longer running");
            return Some(StopReason::EngineExited);
        }

        match self
            .resources
            .store
            .session_record(self.session.site_id())
            .await
        {
            Ok(Some(record)) if record.status == Some(SimStatus::Stopping) => {
                info!("Stop requested through the session record");
                return Some(StopReason::StoreRequested);
            }
            Ok(_) => {}
            Err(err) => debug!("Cannot read the session record: {err}"),
        }

        if self.options.stop_at_end_time
            && self
                .last_datetime
                .is_some_and(|datetime| datetime >= self.session.end())
        {
            info!("Engine reached the session end time");
            return Some(StopReason::EndTimeReached);
        }

        None
    }
}
