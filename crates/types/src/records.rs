// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Records exchanged with the shared state store.

use jiff::Timestamp;
use jiff::civil::DateTime;
use serde::{Deserialize, Serialize};

use crate::identifiers::{PointId, SimulationId, SiteId};

/// Simulation status tag of a site as exposed in its session record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum SimStatus {
    Running,
    /// Set by external callers to request the running session to stop.
    Stopping,
    Stopped,
}

/// Status of the current value of a point.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PointStatus {
    Ok,
    Disabled,
}

/// Per-site session record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Display name of the site.
    pub name: Option<String>,
    pub status: Option<SimStatus>,
    /// Simulation time as reported by the engine after the last step.
    pub datetime: Option<DateTime>,
    pub step: Option<u64>,
}

/// Upsert applied to the session record after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdate {
    /// `None` when the engine outputs of the step could not be turned into a calendar time, the
    /// stored time is then left unchanged.
    pub datetime: Option<DateTime>,
    pub step: u64,
    pub status: SimStatus,
}

/// Per-point live value record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub site_id: SiteId,
    pub value: Option<f64>,
    pub status: Option<PointStatus>,
    pub error: Option<String>,
}

impl PointRecord {
    pub fn new(site_id: SiteId) -> Self {
        Self {
            site_id,
            value: None,
            status: None,
            error: None,
        }
    }
}

/// Values staged by callers for an input point. The values are ordered by priority, the first
/// present non-zero value is the one applied at the next step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOverride {
    pub point_id: PointId,
    pub values: Vec<Option<f64>>,
}

impl PendingOverride {
    pub fn new(point_id: impl Into<PointId>, values: Vec<Option<f64>>) -> Self {
        Self {
            point_id: point_id.into(),
            values,
        }
    }

    /// Returns the value to apply, if any. Empty and zero entries are skipped, entries after the
    /// applied one are ignored.
    pub fn effective_value(&self) -> Option<f64> {
        self.values.iter().find_map(|v| v.filter(|v| *v != 0.0))
    }
}

/// Entry of the sessions history, written once the artifacts of a session were archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub id: SimulationId,
    pub site_id: SiteId,
    pub storage_key: String,
    pub name: String,
    pub time_completed: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_non_zero_value_wins() {
        let o = PendingOverride::new("p", vec![None, Some(0.0), Some(3.0), Some(4.0)]);
        assert_eq!(o.effective_value(), Some(3.0));

        let o = PendingOverride::new("p", vec![None, None]);
        assert_eq!(o.effective_value(), None);

        let o = PendingOverride::new("p", vec![Some(-0.0), Some(0.0)]);
        assert_eq!(o.effective_value(), None);

        let o = PendingOverride::new("p", vec![Some(f64::NAN), Some(1.0)]);
        assert!(o.effective_value().is_some_and(f64::is_nan));
    }

    #[test]
    fn status_tags() {
        assert_eq!(SimStatus::Running.to_string(), "Running");
        assert_eq!("Stopping".parse::<SimStatus>().unwrap(), SimStatus::Stopping);
        assert_eq!(PointStatus::Ok.to_string(), "ok");
        assert_eq!("disabled".parse::<PointStatus>().unwrap(), PointStatus::Disabled);
    }
}
