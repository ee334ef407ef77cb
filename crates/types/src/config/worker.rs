// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::InvalidConfigurationError;

/// # Worker options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct WorkerOptions {
    /// # Concurrent sessions limit
    ///
    /// Maximum number of sessions this worker runs at the same time. Requests above the limit
    /// are rejected.
    pub concurrent_sessions_limit: Option<NonZeroUsize>,

    /// # Work directory
    ///
    /// Root directory under which the per-session working directories are created.
    #[builder(setter(into))]
    pub work_dir: PathBuf,

    /// # Command queue length
    pub command_queue_length: usize,
}

impl WorkerOptions {
    pub(crate) fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.command_queue_length == 0 {
            return Err(InvalidConfigurationError::new(
                "worker.command-queue-length",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrent_sessions_limit: None,
            work_dir: std::env::temp_dir().join("cosim"),
            command_queue_length: 64,
        }
    }
}
