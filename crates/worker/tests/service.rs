// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use googletest::prelude::*;
use jiff::civil::date;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;

use cosim_archive::ObjectStoreArchive;
use cosim_channel::MockClient;
use cosim_control::{ControlChannel, ControlMessage, ControlSubscription, MemoryControlHub};
use cosim_state_store::MemoryStateStore;
use cosim_stepper::SessionResources;
use cosim_types::config::{CoSimOptions, Configuration, StepperOptionsBuilder, WorkerOptionsBuilder};
use cosim_types::errors::GenericError;
use cosim_types::identifiers::{PointId, SiteId};
use cosim_types::records::SimStatus;
use cosim_variables::{Mapping, MappingEntry, OutputVariable, VariableCatalog};
use cosim_worker::{
    ClientFactory, Command, CommandSender, ModelPreparer, PreparedModel, RunSiteRequest, Service,
};

const SITE: &str = "site-1";

/// Writes a three input model with the four clock outputs.
struct StaticModel;

impl ModelPreparer for StaticModel {
    async fn prepare(
        &self,
        request: &RunSiteRequest,
        work_dir: &Path,
    ) -> std::result::Result<PreparedModel, GenericError> {
        let mapping = Mapping(vec![
            MappingEntry::input("heating", "HeatingSetpoint"),
            MappingEntry::input("cooling", "CoolingSetpoint"),
            MappingEntry::input("fan", "FanEnable"),
            MappingEntry::output("minute", "current_minute", "EMS"),
        ]);
        let catalog = VariableCatalog {
            inputs: vec![
                "HeatingSetpoint".to_owned(),
                "CoolingSetpoint".to_owned(),
                "FanEnable".to_owned(),
            ],
            outputs: vec![
                OutputVariable::new("current_month", "EMS"),
                OutputVariable::new("current_day", "EMS"),
                OutputVariable::new("current_hour", "EMS"),
                OutputVariable::new("current_minute", "EMS"),
            ],
        };

        let mapping_path = work_dir.join("mapping.json");
        let catalog_path = work_dir.join("variables.json");
        tokio::fs::write(&mapping_path, serde_json::to_vec(&mapping)?).await?;
        tokio::fs::write(&catalog_path, serde_json::to_vec(&catalog)?).await?;
        tokio::fs::write(work_dir.join("in.idf"), request.site_id.as_str()).await?;

        Ok(PreparedModel {
            work_dir: work_dir.to_owned(),
            mapping_path,
            catalog_path,
            engine_args: vec!["in.idf".into()],
        })
    }
}

#[derive(Clone, Default)]
struct RecordingFactory {
    clients: Arc<Mutex<Vec<MockClient>>>,
}

impl RecordingFactory {
    fn clients(&self) -> Vec<MockClient> {
        self.clients.lock().unwrap().clone()
    }
}

impl ClientFactory for RecordingFactory {
    type Client = MockClient;

    fn create(&self, _options: &CoSimOptions, _model: &PreparedModel) -> MockClient {
        let client = MockClient::new(|step, _| vec![1.0, 1.0, 0.0, step as f64]);
        self.clients.lock().unwrap().push(client.clone());
        client
    }
}

struct Worker {
    site: SiteId,
    store: MemoryStateStore,
    hub: MemoryControlHub,
    objects: Arc<InMemory>,
    factory: RecordingFactory,
    commands: CommandSender,
    work_root: tempfile::TempDir,
}

type TestService =
    Service<RecordingFactory, StaticModel, MemoryStateStore, MemoryControlHub, ObjectStoreArchive>;

fn start_worker() -> (Worker, TestService) {
    let work_root = tempfile::tempdir().unwrap();
    let store = MemoryStateStore::new();
    store.register_site(SITE, Some("s:Office".to_owned()));
    store.register_point(SITE, "minute");
    let hub = MemoryControlHub::new();
    let objects = Arc::new(InMemory::new());
    let factory = RecordingFactory::default();

    let config = Configuration {
        stepper: StepperOptionsBuilder::default()
            .poll_interval(Duration::from_millis(10))
            .build()
            .unwrap(),
        worker: WorkerOptionsBuilder::default()
            .work_dir(work_root.path())
            .build()
            .unwrap(),
        ..Configuration::default()
    };
    let service = Service::new(
        config,
        factory.clone(),
        StaticModel,
        SessionResources {
            store: Arc::new(store.clone()),
            control: Arc::new(hub.clone()),
            archive: Arc::new(ObjectStoreArchive::new(
                objects.clone(),
                ObjectPath::default(),
            )),
        },
    );

    let worker = Worker {
        site: SiteId::from(SITE),
        store,
        hub,
        objects,
        factory,
        commands: service.create_command_sender(),
        work_root,
    };
    (worker, service)
}

impl Worker {
    async fn run_site(&self) {
        let command = Command::from_job(
            br#"{"op": "InvokeAction", "action": "runSite", "id": "site-1",
                 "startDatetime": "2024-01-01 00:00:00", "endDatetime": "2024-01-31 00:00:00",
                 "realtime": "false", "timescale": "1"}"#,
        )
        .unwrap()
        .expect("run site command");
        self.commands.send(command).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while self.hub.subscriber_count(&self.site) == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("session to subscribe");
    }

    async fn wait_for_simulations(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.store.simulations().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session to be archived");
    }
}

#[test_log::test(tokio::test)]
async fn runs_a_session_from_a_job_message() {
    let (worker, service) = start_worker();
    let shutdown = service.shutdown_token();
    let service = tokio::spawn(service.run());

    worker.run_site().await;
    let mut observer = worker.hub.subscribe(&worker.site).await.unwrap();
    worker
        .hub
        .publish(&worker.site, ControlMessage::Advance)
        .await
        .unwrap();
    loop {
        let message = observer
            .next_message(Duration::from_secs(5))
            .await
            .unwrap()
            .expect("step completion");
        if message == ControlMessage::Complete {
            break;
        }
    }
    let running = worker.store.session(&worker.site).unwrap();
    assert_that!(running.step, some(eq(2u64)));
    assert_that!(running.datetime, some(eq(date(2024, 1, 1).at(0, 1, 0, 0))));
    assert_that!(
        worker.store.point(&PointId::from("minute")).unwrap().value,
        some(eq(1.0))
    );

    worker
        .hub
        .publish(&worker.site, ControlMessage::Stop)
        .await
        .unwrap();
    worker.wait_for_simulations(1).await;

    shutdown.cancel();
    service.await.unwrap().unwrap();

    let clients = worker.factory.clients();
    assert_that!(clients.len(), eq(1));
    let steps = clients[0].steps();
    assert_that!(steps.len(), eq(1));
    assert_that!(steps[0].inputs.len(), eq(7));

    let simulation = worker.store.simulations().remove(0);
    assert_that!(simulation.name.as_str(), eq("Office"));
    let model = worker
        .objects
        .get(&ObjectPath::from(format!("{}/in.idf", simulation.storage_key)))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(model, "site-1");

    let session = worker.store.session(&worker.site).unwrap();
    assert_that!(session.status, some(eq(SimStatus::Stopped)));
    assert!(!worker.work_root.path().join(SITE).exists());
}

#[test_log::test(tokio::test)]
async fn shutdown_finalizes_running_sessions() {
    let (worker, service) = start_worker();
    let shutdown = service.shutdown_token();
    let service = tokio::spawn(service.run());

    worker.run_site().await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), service)
        .await
        .expect("service to stop")
        .unwrap()
        .unwrap();

    assert_eq!(worker.store.simulations().len(), 1);
    assert_eq!(worker.factory.clients()[0].stops(), vec![true]);
}
