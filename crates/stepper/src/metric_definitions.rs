// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{Unit, describe_counter, describe_histogram};

pub const STEPPER_STEPS: &str = "cosim.stepper.steps.total";
pub const STEPPER_STEP_DURATION: &str = "cosim.stepper.step_duration.seconds";
pub const STEPPER_UNRESOLVED_POINTS: &str = "cosim.stepper.unresolved_points.total";
pub const STEPPER_CLOCK_MISMATCH: &str = "cosim.stepper.clock_mismatch.total";

pub const STEP_OUTCOME_OK: &str = "ok";
pub const STEP_OUTCOME_FAILED: &str = "failed";

pub const DIRECTION_INPUT: &str = "input";
pub const DIRECTION_OUTPUT: &str = "output";

pub(crate) fn describe_metrics() {
    describe_counter!(
        STEPPER_STEPS,
        Unit::Count,
        "Number of engine steps, by outcome"
    );

    describe_histogram!(
        STEPPER_STEP_DURATION,
        Unit::Seconds,
        "Wall clock time of an engine step round trip"
    );

    describe_counter!(
        STEPPER_UNRESOLVED_POINTS,
        Unit::Count,
        "Number of point values skipped because the point has no engine slot"
    );

    describe_counter!(
        STEPPER_CLOCK_MISMATCH,
        Unit::Count,
        "Number of steps after which the engine clock differed from the expected session time"
    );
}
