// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Derivation of the engine clock from its outputs and comparison with the expected session time.

use std::time::Duration;

use jiff::SignedDuration;
use jiff::civil::DateTime;
use tracing::{debug, warn};

use cosim_types::config::{ExpectedTimeFormula, StepperOptions};
use cosim_variables::VariableIndex;

use crate::metric_definitions::STEPPER_CLOCK_MISMATCH;

const MONTH_KIND: &str = "current_month";
const DAY_KIND: &str = "current_day";
const HOUR_KIND: &str = "current_hour";
const MINUTE_KIND: &str = "current_minute";

#[derive(Debug, thiserror::Error)]
pub enum DataResolutionError {
    #[error("engine catalog has no '{0}' output")]
    MissingClockOutput(&'static str),
    #[error("engine returned {actual} outputs, expected at least {expected}")]
    ShortOutputVector { expected: usize, actual: usize },
    #[error("engine output '{kind}' is not a valid calendar component: {value}")]
    InvalidComponent { kind: &'static str, value: f64 },
    #[error("engine clock does not form a valid date time: {0}")]
    InvalidDateTime(#[from] jiff::Error),
}

/// Output slots carrying the engine clock.
#[derive(Debug, Clone, Copy)]
struct ClockSlots {
    month: usize,
    day: usize,
    hour: usize,
    minute: usize,
}

impl ClockSlots {
    /// Fails with the first clock kind missing from the catalog.
    fn resolve(index: &VariableIndex, name: &str) -> Result<Self, &'static str> {
        let slot = |kind: &'static str| index.output_index_by_kind_and_name(kind, name).ok_or(kind);
        Ok(Self {
            month: slot(MONTH_KIND)?,
            day: slot(DAY_KIND)?,
            hour: slot(HOUR_KIND)?,
            minute: slot(MINUTE_KIND)?,
        })
    }

    fn max_slot(&self) -> usize {
        self.month.max(self.day).max(self.hour).max(self.minute)
    }
}

/// The engine reports the end of an hour as minute 60. The day is not advanced when the hour
/// wraps.
pub fn rollover(hour: i8, minute: i8) -> (i8, i8) {
    match (hour, minute) {
        (23, 60) => (0, 0),
        (hour, 60) => (hour.saturating_add(1), 0),
        other => other,
    }
}

fn component(kind: &'static str, value: f64) -> Result<i8, DataResolutionError> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < f64::from(i8::MIN) || rounded > f64::from(i8::MAX) {
        return Err(DataResolutionError::InvalidComponent { kind, value });
    }
    Ok(rounded as i8)
}

/// Expected session time before the given step, `None` when it is not representable.
pub fn expected_datetime(
    start: DateTime,
    step: u64,
    step_duration: Duration,
    formula: ExpectedTimeFormula,
) -> Option<DateTime> {
    let elapsed_steps = step.checked_sub(1)?;
    let seconds = match formula {
        ExpectedTimeFormula::Linear => elapsed_steps.checked_mul(step_duration.as_secs())?,
        ExpectedTimeFormula::Legacy => elapsed_steps.checked_mul(step)?,
    };
    let seconds = i64::try_from(seconds).ok()?;
    start.checked_add(SignedDuration::from_secs(seconds)).ok()
}

/// Reconciles the engine clock with the time the session expects.
#[derive(Debug)]
pub struct ClockReconciler {
    slots: Result<ClockSlots, &'static str>,
    start: DateTime,
    step_duration: Duration,
    formula: ExpectedTimeFormula,
}

impl ClockReconciler {
    pub fn new(index: &VariableIndex, options: &StepperOptions, start: DateTime) -> Self {
        let slots = ClockSlots::resolve(index, &options.clock_output_name);
        if let Err(kind) = slots {
            warn!(
                "Engine catalog has no '{kind}' output for '{}', the session time will not be reported",
                options.clock_output_name
            );
        }
        Self {
            slots,
            start,
            step_duration: options.step_duration(),
            formula: options.expected_time_formula,
        }
    }

    /// Engine clock after a step, as reported in `outputs`. The year is the one of the session
    /// start.
    pub fn engine_datetime(&self, outputs: &[f64]) -> Result<DateTime, DataResolutionError> {
        let slots = self
            .slots
            .map_err(DataResolutionError::MissingClockOutput)?;
        if outputs.len() <= slots.max_slot() {
            return Err(DataResolutionError::ShortOutputVector {
                expected: slots.max_slot() + 1,
                actual: outputs.len(),
            });
        }

        let month = component(MONTH_KIND, outputs[slots.month])?;
        let day = component(DAY_KIND, outputs[slots.day])?;
        let (hour, minute) = rollover(
            component(HOUR_KIND, outputs[slots.hour])?,
            component(MINUTE_KIND, outputs[slots.minute])?,
        );

        Ok(DateTime::new(
            self.start.year(),
            month,
            day,
            hour,
            minute,
            0,
            0,
        )?)
    }

    /// Reads the engine clock after the step that moved the session to `next_step` and compares
    /// it with the expected time. A mismatch is reported but the engine clock is returned.
    pub fn reconcile(
        &self,
        next_step: u64,
        outputs: &[f64],
    ) -> Result<DateTime, DataResolutionError> {
        let engine = self.engine_datetime(outputs)?;
        let Some(expected) =
            expected_datetime(self.start, next_step, self.step_duration, self.formula)
        else {
            debug!(step = next_step, %engine, "Expected session time is not representable");
            return Ok(engine);
        };

        let drift = engine.duration_since(expected).abs();
        let tolerance = SignedDuration::try_from(self.step_duration).unwrap_or(SignedDuration::MAX);
        if drift > tolerance {
            metrics::counter!(STEPPER_CLOCK_MISMATCH).increment(1);
            warn!(
                step = next_step,
                %engine,
                %expected,
                "Engine clock drifted by {drift:#} from the expected session time"
            );
        } else {
            debug!(step = next_step, %engine, %expected, "Engine clock reconciled");
        }
        Ok(engine)
    }
}
