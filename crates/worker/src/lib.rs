// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Worker running co-simulation sessions on behalf of job messages.

mod job;
mod metric_definitions;
mod preparer;
mod service;

use std::path::PathBuf;

use cosim_stepper::SessionError;
use cosim_types::errors::GenericError;

pub use job::{Job, JobError, RunSiteRequest};
pub use metric_definitions::*;
pub use preparer::{ClientFactory, ModelPreparer, PreparedModel, ProcessClientFactory};
pub use service::{Command, CommandReceiver, CommandSender, Rejection, Service};

/// Failure of a session run by the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot prepare working directory '{}': {source}", path.display())]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model preparation failed: {0}")]
    Prepare(#[source] GenericError),
    #[error(transparent)]
    Variables(#[from] cosim_variables::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("session cancelled before the engine started")]
    Cancelled,
}
