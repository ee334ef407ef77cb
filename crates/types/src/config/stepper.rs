// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use super::InvalidConfigurationError;

/// Formula used to compute the time the engine is expected to report after a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpectedTimeFormula {
    /// `start + (step - 1) * step-duration`
    #[default]
    Linear,
    /// `start + (step - 1) * step` seconds, as computed by older workers. Only affects the
    /// diagnostic comparison.
    Legacy,
}

/// # Stepper options
///
/// Options of the per-session stepping loop.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct StepperOptions {
    /// # Step duration
    ///
    /// Simulated time covered by one step. The engine must be configured with the matching
    /// number of timesteps per hour.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    step_duration: humantime::Duration,

    /// # Control poll interval
    ///
    /// Upper bound of the time the loop waits for a control message before it checks the stop
    /// conditions again.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    poll_interval: humantime::Duration,

    /// # Master enable bypass
    ///
    /// When set, the master enable input is forced off at every step and pending overrides are
    /// not applied.
    pub master_enable_bypass: bool,

    /// # Master enable variable
    ///
    /// Name of the engine input variable acting as master enable.
    pub master_enable_variable: String,

    /// # Clock output name
    ///
    /// Name under which the engine reports the `current_month`, `current_day`, `current_hour`
    /// and `current_minute` outputs.
    pub clock_output_name: String,

    /// # Expected time formula
    pub expected_time_formula: ExpectedTimeFormula,

    /// # Stop at end time
    ///
    /// Stop the session once the engine reports a time at or after the session end.
    pub stop_at_end_time: bool,
}

impl StepperOptions {
    pub fn step_duration(&self) -> Duration {
        self.step_duration.into()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval.into()
    }

    pub(crate) fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.step_duration().is_zero() {
            return Err(InvalidConfigurationError::new(
                "stepper.step-duration",
                "must be greater than zero",
            ));
        }
        if self.step_duration().subsec_nanos() != 0 {
            return Err(InvalidConfigurationError::new(
                "stepper.step-duration",
                "must be a whole number of seconds",
            ));
        }
        if self.poll_interval().is_zero() {
            return Err(InvalidConfigurationError::new(
                "stepper.poll-interval",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for StepperOptions {
    fn default() -> Self {
        Self {
            step_duration: Duration::from_secs(60).into(),
            poll_interval: Duration::from_millis(100).into(),
            master_enable_bypass: true,
            master_enable_variable: "MasterEnable".to_owned(),
            clock_output_name: "EMS".to_owned(),
            expected_time_formula: ExpectedTimeFormula::default(),
            stop_at_end_time: true,
        }
    }
}
