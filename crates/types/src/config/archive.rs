// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use super::InvalidConfigurationError;

/// # Archive options
///
/// Where the artifacts of finished sessions are stored.
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct ArchiveOptions {
    /// # Destination
    ///
    /// Object store URL artifacts are uploaded to, e.g. `s3://bucket/prefix`,
    /// `file:///var/lib/cosim/archive` or `memory:///`.
    #[builder(setter(into))]
    pub destination: String,

    /// # Key prefix
    ///
    /// First path segment of every archived object key.
    #[builder(setter(into))]
    pub key_prefix: String,

    /// # Remove working directory
    ///
    /// Delete the local session working directory once it was archived.
    pub remove_work_dir: bool,
}

impl ArchiveOptions {
    pub(crate) fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.destination.is_empty() {
            return Err(InvalidConfigurationError::new(
                "archive.destination",
                "must not be empty",
            ));
        }
        if self.key_prefix.contains("..") {
            return Err(InvalidConfigurationError::new(
                "archive.key-prefix",
                "must not contain relative path segments",
            ));
        }
        Ok(())
    }
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            destination: "file:///var/lib/cosim/archive".to_owned(),
            key_prefix: "simulated".to_owned(),
            remove_work_dir: true,
        }
    }
}
