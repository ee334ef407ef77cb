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
use std::path::Path;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use cosim_archive::ArchiveStorage;
use cosim_control::ControlChannel;
use cosim_state_store::StateStore;
use cosim_stepper::{SessionContext, SessionResources, SessionSummary, StepDriver};
use cosim_types::config::Configuration;
use cosim_types::identifiers::SiteId;
use cosim_variables::VariableIndex;

use crate::Error;
use crate::job::{Job, JobError, RunSiteRequest};
use crate::metric_definitions::{
    SESSION_OUTCOME_CANCELLED, SESSION_OUTCOME_FAILED, SESSION_OUTCOME_REJECTED, SESSION_OUTCOME_STOPPED, WORKER_SESSIONS,
    WORKER_SESSIONS_ACTIVE, describe_metrics,
};
use crate::preparer::{ClientFactory, ModelPreparer};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    RunSite(RunSiteRequest),
}

impl Command {
    /// Turns a job message into a command. Jobs not handled by the worker yield `None`.
    pub fn from_job(payload: &[u8]) -> Result<Option<Self>, JobError> {
        match Job::decode(payload)? {
            Job::RunSite(request) => Ok(Some(Command::RunSite(request))),
            Job::Ignored { op, action } => {
                debug!(%op, ?action, "Ignoring job");
                Ok(None)
            }
        }
    }
}

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("site '{0}' already runs a session")]
    SiteBusy(SiteId),
    #[error("concurrent sessions limit of {0} reached")]
    LimitReached(usize),
    #[error("worker is shutting down")]
    ShuttingDown,
}

type SessionResult = (SiteId, Result<SessionSummary, Error>);

/// Runs one stepping session per accepted [`Command::RunSite`].
pub struct Service<F, P, S, H, A> {
    config: Arc<Configuration>,
    factory: Arc<F>,
    preparer: Arc<P>,
    resources: SessionResources<S, H, A>,

    commands_tx: CommandSender,
    commands_rx: CommandReceiver,
    cancellation: CancellationToken,

    sessions: JoinSet<SessionResult>,
    active: HashMap<SiteId, AbortHandle>,
}

impl<F, P, S, H, A> Service<F, P, S, H, A>
where
    F: ClientFactory,
    P: ModelPreparer,
    S: StateStore,
    H: ControlChannel,
    A: ArchiveStorage,
{
    pub fn new(
        config: Configuration,
        factory: F,
        preparer: P,
        resources: SessionResources<S, H, A>,
    ) -> Self {
        describe_metrics();
        let (commands_tx, commands_rx) = mpsc::channel(config.worker.command_queue_length);

        Self {
            config: Arc::new(config),
            factory: Arc::new(factory),
            preparer: Arc::new(preparer),
            resources,
            commands_tx,
            commands_rx,
            cancellation: CancellationToken::new(),
            sessions: JoinSet::new(),
            active: HashMap::new(),
        }
    }

    pub fn create_command_sender(&self) -> CommandSender {
        self.commands_tx.clone()
    }

    /// Cancelling the token shuts the service down. Running sessions are stopped at their next
    /// poll tick and finalized before [`Service::run`] returns.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        info!("Worker service started");
        let cancellation = self.cancellation.clone();

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                Some(command) = self.commands_rx.recv() => {
                    match command {
                        Command::RunSite(request) => {
                            let site_id = request.site_id.clone();
                            if let Err(rejection) = self.start_session(request) {
                                counter!(WORKER_SESSIONS, "outcome" => SESSION_OUTCOME_REJECTED).increment(1);
                                warn!(%site_id, "Rejected session: {rejection}");
                            }
                        }
                    }
                }
                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    self.handle_session_end(joined);
                }
            }
            gauge!(WORKER_SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        }

        info!(sessions = self.sessions.len(), "Worker service shutting down");
        while let Some(joined) = self.sessions.join_next().await {
            self.handle_session_end(joined);
        }
        gauge!(WORKER_SESSIONS_ACTIVE).set(0.0);
        Ok(())
    }

    fn start_session(&mut self, request: RunSiteRequest) -> Result<(), Rejection> {
        if self.cancellation.is_cancelled() {
            return Err(Rejection::ShuttingDown);
        }
        if self.active.contains_key(&request.site_id) {
            return Err(Rejection::SiteBusy(request.site_id));
        }
        if let Some(limit) = self.config.worker.concurrent_sessions_limit {
            if self.active.len() >= limit.get() {
                return Err(Rejection::LimitReached(limit.get()));
            }
        }
        if request.realtime {
            warn!(site_id = %request.site_id, "Internally clocked sessions are not supported, the session waits for advance signals");
        }

        let site_id = request.site_id.clone();
        let task = run_session(
            request,
            Arc::clone(&self.config),
            Arc::clone(&self.factory),
            Arc::clone(&self.preparer),
            self.resources.clone(),
            self.cancellation.child_token(),
        );
        let task_site_id = site_id.clone();
        let handle = self
            .sessions
            .spawn(async move { (task_site_id, task.await) });
        info!(%site_id, "Started session");
        self.active.insert(site_id, handle);
        Ok(())
    }

    fn handle_session_end(&mut self, joined: Result<SessionResult, JoinError>) {
        match joined {
            Ok((site_id, result)) => {
                self.active.remove(&site_id);
                match result {
                    Ok(summary) => {
                        counter!(WORKER_SESSIONS, "outcome" => SESSION_OUTCOME_STOPPED).increment(1);
                        info!(
                            %site_id,
                            steps = summary.steps_completed,
                            stop_reason = ?summary.stop_reason,
                            simulation_id = %summary.simulation.id,
                            "Session completed"
                        );
                    }
                    Err(Error::Cancelled) => {
                        counter!(WORKER_SESSIONS, "outcome" => SESSION_OUTCOME_CANCELLED).increment(1);
                        info!(%site_id, "Session cancelled before the engine started");
                    }
                    Err(err) => {
                        counter!(WORKER_SESSIONS, "outcome" => SESSION_OUTCOME_FAILED).increment(1);
                        error!(%site_id, "Session failed: {err}");
                    }
                }
            }
            Err(err) => {
                counter!(WORKER_SESSIONS, "outcome" => SESSION_OUTCOME_FAILED).increment(1);
                error!("Session task failed: {err}");
                self.active.retain(|_, handle| !handle.is_finished());
            }
        }
    }
}

async fn prepare_work_dir(path: &Path) -> Result<(), Error> {
    let io_error = |source| Error::WorkDir {
        path: path.to_owned(),
        source,
    };
    if tokio::fs::try_exists(path).await.map_err(io_error)? {
        debug!(path = %path.display(), "Removing stale working directory");
        tokio::fs::remove_dir_all(path).await.map_err(io_error)?;
    }
    tokio::fs::create_dir_all(path).await.map_err(io_error)
}

async fn run_session<F, P, S, H, A>(
    request: RunSiteRequest,
    config: Arc<Configuration>,
    factory: Arc<F>,
    preparer: Arc<P>,
    resources: SessionResources<S, H, A>,
    cancellation: CancellationToken,
) -> Result<SessionSummary, Error>
where
    F: ClientFactory,
    P: ModelPreparer,
    S: StateStore,
    H: ControlChannel,
    A: ArchiveStorage,
{
    let work_dir = config.worker.work_dir.join(request.site_id.as_str());
    prepare_work_dir(&work_dir).await?;

    let model = tokio::select! {
        _ = cancellation.cancelled() => return Err(Error::Cancelled),
        model = preparer.prepare(&request, &work_dir) => model.map_err(Error::Prepare)?,
    };
    let index = VariableIndex::from_files(
        &model.mapping_path,
        &model.catalog_path,
        &config.stepper.master_enable_variable,
    )?;
    debug!(
        site_id = %request.site_id,
        inputs = index.input_len(),
        outputs = index.output_len(),
        "Resolved engine variables"
    );

    let client = factory.create(&config.cosim, &model);
    let context = SessionContext {
        site_id: request.site_id,
        start: request.start,
        end: request.end,
        work_dir: model.work_dir,
    };
    let summary = StepDriver::new(context, client, index, resources, &config)
        .run(cancellation)
        .await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::path::PathBuf;

    use googletest::prelude::*;
    use jiff::civil::date;

    use cosim_archive::ObjectStoreArchive;
    use cosim_channel::MockClient;
    use cosim_control::MemoryControlHub;
    use cosim_state_store::MemoryStateStore;
    use cosim_types::config::WorkerOptionsBuilder;
    use cosim_types::errors::GenericError;

    use super::*;
    use crate::preparer::PreparedModel;

    struct NeverReady;

    impl ModelPreparer for NeverReady {
        async fn prepare(
            &self,
            _request: &RunSiteRequest,
            _work_dir: &Path,
        ) -> std::result::Result<PreparedModel, GenericError> {
            std::future::pending().await
        }
    }

    struct Mocks;

    impl ClientFactory for Mocks {
        type Client = MockClient;

        fn create(
            &self,
            _options: &cosim_types::config::CoSimOptions,
            _model: &PreparedModel,
        ) -> MockClient {
            MockClient::new(|_, _| vec![])
        }
    }

    fn request(site: &str) -> RunSiteRequest {
        RunSiteRequest {
            site_id: SiteId::from(site),
            start: date(2024, 1, 1).at(0, 0, 0, 0),
            end: date(2024, 1, 2).at(0, 0, 0, 0),
            realtime: false,
            timescale: None,
        }
    }

    fn service(
        work_dir: PathBuf,
        limit: Option<usize>,
    ) -> Service<Mocks, NeverReady, MemoryStateStore, MemoryControlHub, ObjectStoreArchive> {
        let config = Configuration {
            worker: WorkerOptionsBuilder::default()
                .work_dir(work_dir)
                .concurrent_sessions_limit(limit.and_then(NonZeroUsize::new))
                .build()
                .unwrap(),
            ..Configuration::default()
        };
        Service::new(
            config,
            Mocks,
            NeverReady,
            SessionResources {
                store: Arc::new(MemoryStateStore::new()),
                control: Arc::new(MemoryControlHub::new()),
                archive: Arc::new(ObjectStoreArchive::new(
                    Arc::new(object_store::memory::InMemory::new()),
                    object_store::path::Path::default(),
                )),
            },
        )
    }

    #[test_log::test(tokio::test)]
    async fn one_session_per_site() {
        let work_dir = tempfile::tempdir().unwrap();
        let mut service = service(work_dir.path().to_owned(), None);

        assert!(service.start_session(request("a")).is_ok());
        assert_eq!(
            service.start_session(request("a")),
            Err(Rejection::SiteBusy(SiteId::from("a")))
        );
        assert!(service.start_session(request("b")).is_ok());
        assert_that!(service.active.len(), eq(2));
    }

    #[test_log::test(tokio::test)]
    async fn sessions_above_the_limit_are_rejected() {
        let work_dir = tempfile::tempdir().unwrap();
        let mut service = service(work_dir.path().to_owned(), Some(1));

        assert!(service.start_session(request("a")).is_ok());
        assert_eq!(
            service.start_session(request("b")),
            Err(Rejection::LimitReached(1))
        );

        service.cancellation.cancel();
        assert_eq!(
            service.start_session(request("c")),
            Err(Rejection::ShuttingDown)
        );
    }

    #[test_log::test(tokio::test)]
    async fn shutdown_cancels_sessions_waiting_for_their_model() {
        let work_dir = tempfile::tempdir().unwrap();
        let service = service(work_dir.path().to_owned(), None);
        let commands = service.create_command_sender();
        let shutdown = service.shutdown_token();
        let running = tokio::spawn(service.run());

        commands
            .send(Command::RunSite(request("a")))
            .await
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !work_dir.path().join("a").exists() {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("session to prepare its working directory");

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), running)
            .await
            .expect("service to stop")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn run_site_jobs_become_commands() {
        let command = Command::from_job(
            br#"{"op": "InvokeAction", "action": "runSite", "id": "a",
                 "startDatetime": "2024-01-01 00:00:00", "endDatetime": "2024-01-02 00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(command, Some(Command::RunSite(request("a"))));

        assert_eq!(
            Command::from_job(br#"{"op": "InvokeAction", "action": "addSite"}"#).unwrap(),
            None
        );
    }
}
