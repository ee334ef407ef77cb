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
use std::future::Future;
use std::path::{Path, PathBuf};

use cosim_channel::{CoSimClient, PacketCodec, ProcessClient};
use cosim_types::config::CoSimOptions;
use cosim_types::errors::GenericError;

use crate::job::RunSiteRequest;

/// Model files of a site, ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedModel {
    /// Engine working directory.
    pub work_dir: PathBuf,
    /// Mapping of the site points to engine variables.
    pub mapping_path: PathBuf,
    /// Variable catalog of the engine model.
    pub catalog_path: PathBuf,
    /// Model specific engine arguments, e.g. the engine input and weather files.
    pub engine_args: Vec<OsString>,
}

/// Fetches the model of a site and turns it into the engine input format.
pub trait ModelPreparer: Send + Sync + 'static {
    /// Prepares the model of `request.site_id` inside `work_dir`, which exists and is empty.
    fn prepare(
        &self,
        request: &RunSiteRequest,
        work_dir: &Path,
    ) -> impl Future<Output = Result<PreparedModel, GenericError>> + Send;
}

/// Creates the engine client of a session.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: CoSimClient + 'static;

    fn create(&self, options: &CoSimOptions, model: &PreparedModel) -> Self::Client;
}

/// Launches the engine as a child process of the worker.
#[derive(Debug, Clone)]
pub struct ProcessClientFactory<C> {
    codec: C,
}

impl<C> ProcessClientFactory<C> {
    pub fn new(codec: C) -> Self {
        Self { codec }
    }
}

impl<C: PacketCodec + Clone> ClientFactory for ProcessClientFactory<C> {
    type Client = ProcessClient<C>;

    fn create(&self, options: &CoSimOptions, model: &PreparedModel) -> Self::Client {
        ProcessClient::new(options.clone(), self.codec.clone(), &model.work_dir)
            .with_model_args(model.engine_args.iter().cloned())
    }
}
