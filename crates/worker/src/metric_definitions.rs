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
use metrics::{Unit, describe_counter, describe_gauge};

pub const WORKER_SESSIONS_ACTIVE: &str = "cosim.worker.sessions.active";
pub const WORKER_SESSIONS: &str = "cosim.worker.sessions.total";

pub const SESSION_OUTCOME_STOPPED: &str = "stopped";
pub const SESSION_OUTCOME_FAILED: &str = "failed";
pub const SESSION_OUTCOME_REJECTED: &str = "rejected";
pub const SESSION_OUTCOME_CANCELLED: &str = "cancelled";

pub(crate) fn describe_metrics() {
    describe_gauge!(
        WORKER_SESSIONS_ACTIVE,
        Unit::Count,
        "Number of sessions currently running on this worker"
    );

    describe_counter!(
        WORKER_SESSIONS,
        Unit::Count,
        "Number of sessions handled by this worker, by outcome"
    );
}
