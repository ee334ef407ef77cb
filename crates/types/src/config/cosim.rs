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
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::InvalidConfigurationError;

/// # Co-simulation options
///
/// How the external engine process is launched and connected to.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct CoSimOptions {
    /// # Engine program
    ///
    /// Executable of the engine. Resolved through `PATH` when relative.
    #[builder(setter(into))]
    pub program: PathBuf,

    /// # Engine arguments
    ///
    /// Arguments passed before the model specific ones (engine input and weather file).
    pub args: Vec<String>,

    /// # Engine environment
    ///
    /// Additional environment variables of the engine process.
    pub env: HashMap<String, String>,

    /// # Bind address
    ///
    /// Address the worker listens on for the engine connection. Port `0` picks a free port.
    pub bind_address: SocketAddr,

    /// # Accept timeout
    ///
    /// How long to wait for the engine to connect back after launch.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    accept_timeout: humantime::Duration,

    /// # Stop timeout
    ///
    /// How long a graceful stop waits for the engine to exit before it is killed.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    stop_timeout: humantime::Duration,
}

impl CoSimOptions {
    pub fn accept_timeout(&self) -> Duration {
        self.accept_timeout.into()
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout.into()
    }

    pub(crate) fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.program.as_os_str().is_empty() {
            return Err(InvalidConfigurationError::new(
                "cosim.program",
                "must not be empty",
            ));
        }
        if self.accept_timeout().is_zero() {
            return Err(InvalidConfigurationError::new(
                "cosim.accept-timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for CoSimOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("energyplus"),
            args: Vec::new(),
            env: HashMap::new(),
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            accept_timeout: Duration::from_secs(30).into(),
            stop_timeout: Duration::from_secs(10).into(),
        }
    }
}
