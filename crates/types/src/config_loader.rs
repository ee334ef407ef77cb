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

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::debug;

use crate::config::{Configuration, InvalidConfigurationError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigLoadError {
    #[error("configuration loading error: {0}")]
    Figment(Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] InvalidConfigurationError),
}

// Because thiserror doesn't support auto-boxing or auto implements From with boxing.
impl From<figment::Error> for ConfigLoadError {
    fn from(value: figment::Error) -> Self {
        Self::Figment(Box::new(value))
    }
}

/// Loads the [`Configuration`] from, in increasing priority: the defaults, an optional TOML
/// file and `COSIM_` prefixed environment variables. Nested keys are separated by `__` in
/// variable names, e.g. `COSIM_STEPPER__POLL_INTERVAL=250ms`.
#[derive(Debug, Default, derive_builder::Builder)]
#[builder(default)]
pub struct ConfigLoader {
    #[builder(setter(strip_option, into))]
    path: Option<PathBuf>,
    load_env: bool,
    #[builder(setter(strip_option))]
    custom_default: Option<Configuration>,
}

impl ConfigLoader {
    pub fn load_once(&self) -> Result<Configuration, ConfigLoadError> {
        let defaults = self.custom_default.clone().unwrap_or_default();

        let mut figment = Figment::from(Serialized::defaults(defaults));
        // Load configuration file
        if let Some(path) = &self.path {
            debug!("Loading configuration file {}", path.display());
            figment = figment.merge(Toml::file_exact(path.as_path()));
        }

        // Merge with environment variables
        if self.load_env {
            figment = Self::merge_with_env(figment);
        }

        let config: Configuration = figment.extract()?;
        config.validate()?;

        Ok(config)
    }

    fn merge_with_env(figment: Figment) -> Figment {
        figment.merge(
            Env::prefixed("COSIM_")
                .split("__")
                .map(|k| k.as_str().replace('_', "-").into()),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use googletest::prelude::*;

    use super::*;
    use crate::config::{ExpectedTimeFormula, StepperOptionsBuilder};

    #[test]
    fn defaults_are_valid() {
        let config = ConfigLoader::default().load_once().unwrap();

        assert_that!(config.stepper.step_duration(), eq(Duration::from_secs(60)));
        assert_that!(config.stepper.poll_interval(), eq(Duration::from_millis(100)));
        assert_that!(config.cosim.accept_timeout(), eq(Duration::from_secs(30)));
        assert_that!(config.stepper.master_enable_bypass, eq(true));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[stepper]
step-duration = "5m"
expected-time-formula = "legacy"
master-enable-bypass = false

[archive]
destination = "memory:///"
"#
        )
        .unwrap();

        let config = ConfigLoaderBuilder::default()
            .path(file.path())
            .build()
            .unwrap()
            .load_once()
            .unwrap();

        assert_that!(config.stepper.step_duration(), eq(Duration::from_secs(300)));
        assert_that!(
            config.stepper.expected_time_formula,
            eq(ExpectedTimeFormula::Legacy)
        );
        assert_that!(config.stepper.master_enable_bypass, eq(false));
        assert_that!(config.archive.destination.as_str(), eq("memory:///"));
        // untouched sections keep their defaults
        assert_that!(config.archive.key_prefix.as_str(), eq("simulated"));
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("cosim.toml", "[stepper]\npoll-interval = \"1s\"\n")?;
            jail.set_env("COSIM_STEPPER__POLL_INTERVAL", "250ms");
            jail.set_env("COSIM_COSIM__PROGRAM", "/opt/engine/bin/run");

            let config = ConfigLoaderBuilder::default()
                .path("cosim.toml")
                .load_env(true)
                .build()
                .unwrap()
                .load_once()
                .unwrap();

            assert_eq!(config.stepper.poll_interval(), Duration::from_millis(250));
            assert_eq!(
                config.cosim.program,
                std::path::PathBuf::from("/opt/engine/bin/run")
            );
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        let stepper = StepperOptionsBuilder::default()
            .step_duration(Duration::from_millis(1500))
            .build()
            .unwrap();
        let loader = ConfigLoaderBuilder::default()
            .custom_default(Configuration {
                stepper,
                ..Default::default()
            })
            .build()
            .unwrap();

        assert_that!(
            loader.load_once(),
            err(pat!(ConfigLoadError::InvalidConfiguration(anything())))
        );
    }

    #[test]
    fn malformed_duration_is_a_load_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("cosim.toml", "[stepper]\nstep-duration = \"soon\"\n")?;

            let result = ConfigLoaderBuilder::default()
                .path("cosim.toml")
                .build()
                .unwrap()
                .load_once();

            assert!(matches!(result, Err(ConfigLoadError::Figment(_))));
            Ok(())
        });
    }
}
