// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod archive;
mod cosim;
mod stepper;
mod worker;

pub use archive::*;
pub use cosim::*;
pub use stepper::*;
pub use worker::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
#[error("invalid option '{name}'. Reason: {reason}")]
pub struct InvalidConfigurationError {
    name: &'static str,
    reason: &'static str,
}

impl InvalidConfigurationError {
    pub(crate) fn new(name: &'static str, reason: &'static str) -> Self {
        Self { name, reason }
    }
}

/// # Worker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct Configuration {
    pub stepper: StepperOptions,
    pub cosim: CoSimOptions,
    pub archive: ArchiveOptions,
    pub worker: WorkerOptions,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        self.stepper.validate()?;
        self.cosim.validate()?;
        self.archive.validate()?;
        self.worker.validate()?;
        Ok(())
    }
}
