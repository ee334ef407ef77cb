// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Synchronization of the engine inputs and outputs with the shared state store.

use std::sync::Arc;

use tracing::{debug, warn};

use cosim_state_store::StateStore;
use cosim_types::identifiers::SiteId;
use cosim_types::records::{PendingOverride, PointStatus, SessionUpdate};
use cosim_variables::VariableIndex;

use crate::metric_definitions::{DIRECTION_INPUT, DIRECTION_OUTPUT, STEPPER_UNRESOLVED_POINTS};

/// Fills `inputs` for the next step.
///
/// With `master_enable_bypass` only the master enable slot is cleared and every other slot keeps
/// its previous value. Otherwise the vector is cleared, the master enable slot is set and the
/// first present non-zero value of every override is written to the value slot of its input, together
/// with its enable flag.
pub fn apply_overrides(
    inputs: &mut [f64],
    index: &VariableIndex,
    overrides: &[PendingOverride],
    master_enable_bypass: bool,
) {
    let master = index.master_enable_index();
    if master_enable_bypass {
        inputs[master] = 0.0;
        return;
    }

    inputs.fill(0.0);
    inputs[master] = 1.0;
    for pending in overrides {
        let Some(value) = pending.effective_value() else {
            continue;
        };
        match index.input_index(pending.point_id.as_str()) {
            Some(slot) if slot + 1 < master => {
                inputs[slot] = value;
                inputs[slot + 1] = 1.0;
            }
            _ => {
                metrics::counter!(STEPPER_UNRESOLVED_POINTS, "direction" => DIRECTION_INPUT)
                    .increment(1);
                warn!(point = %pending.point_id, "Ignoring override of a point without engine input");
            }
        }
    }
}

/// Reads pending overrides before a step and publishes the outputs after it.
pub struct LiveStateSync<S> {
    store: Arc<S>,
    site_id: SiteId,
    inputs: Vec<f64>,
}

impl<S: StateStore> LiveStateSync<S> {
    pub fn new(store: Arc<S>, site_id: SiteId, index: &VariableIndex) -> Self {
        Self {
            store,
            site_id,
            inputs: vec![0.0; index.input_len()],
        }
    }

    /// Input vector of the next step. A store failure is logged and the step proceeds without
    /// overrides.
    pub async fn prepare_inputs(
        &mut self,
        index: &VariableIndex,
        master_enable_bypass: bool,
    ) -> &[f64] {
        let overrides = if master_enable_bypass {
            Vec::new()
        } else {
            match self.store.pending_overrides(&self.site_id).await {
                Ok(overrides) => overrides,
                Err(err) => {
                    warn!(site_id = %self.site_id, "Cannot read pending overrides: {err}");
                    Vec::new()
                }
            }
        };

        apply_overrides(&mut self.inputs, index, &overrides, master_enable_bypass);
        &self.inputs
    }

    /// Publishes the value of every output point and the session progress. Store failures are
    /// logged, the session keeps stepping.
    pub async fn publish(&self, index: &VariableIndex, outputs: &[f64], update: SessionUpdate) {
        let mut published = 0;
        for point in index.output_ids() {
            let Some(value) = index
                .output_index(point.as_str())
                .and_then(|slot| outputs.get(slot))
            else {
                metrics::counter!(STEPPER_UNRESOLVED_POINTS, "direction" => DIRECTION_OUTPUT)
                    .increment(1);
                warn!(%point, "Skipping output point without engine value");
                continue;
            };

            match self
                .store
                .upsert_point_value(point, *value, PointStatus::Ok)
                .await
            {
                Ok(()) => published += 1,
                Err(err) => warn!(%point, "Cannot publish output value: {err}"),
            }
        }

        if let Err(err) = self.store.update_session(&self.site_id, update).await {
            warn!(site_id = %self.site_id, step = update.step, "Cannot update session record: {err}");
        }
        debug!(site_id = %self.site_id, step = update.step, "Published {published} output values");
    }
}

#[cfg(test)]
mod tests {
    use cosim_variables::{Mapping, MappingEntry, VariableCatalog};

    use super::*;

    fn index() -> VariableIndex {
        VariableIndex::new(
            Mapping(vec![
                MappingEntry::input("heating", "HeatingSetpoint"),
                MappingEntry::input("cooling", "CoolingSetpoint"),
                MappingEntry::input("dangling", "NotInCatalog"),
            ]),
            VariableCatalog {
                inputs: vec!["HeatingSetpoint".to_owned(), "CoolingSetpoint".to_owned()],
                outputs: vec![],
            },
            "MasterEnable",
        )
    }

    #[test]
    fn bypass_only_clears_master_enable() {
        let index = index();
        let mut inputs = vec![20.0, 1.0, 0.0, 0.0, 1.0];
        apply_overrides(
            &mut inputs,
            &index,
            &[PendingOverride::new("cooling", vec![Some(24.0)])],
            true,
        );
        assert_eq!(inputs, vec![20.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn without_overrides_only_master_enable_is_set() {
        let index = index();
        let mut inputs = vec![20.0, 1.0, 0.0, 0.0, 0.0];
        apply_overrides(&mut inputs, &index, &[], false);
        assert_eq!(inputs, vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn first_non_zero_value_is_applied() {
        let index = index();
        let mut inputs = vec![0.0; index.input_len()];
        apply_overrides(
            &mut inputs,
            &index,
            &[
                PendingOverride::new("cooling", vec![None, Some(0.0), Some(26.0)]),
                PendingOverride::new("heating", vec![None, None]),
                PendingOverride::new("dangling", vec![Some(1.0)]),
                PendingOverride::new("unknown", vec![Some(1.0)]),
            ],
            false,
        );
        assert_eq!(inputs, vec![0.0, 0.0, 26.0, 1.0, 1.0]);
    }

    #[test]
    fn zero_only_override_leaves_input_disabled() {
        let index = index();
        let mut inputs = vec![0.0; index.input_len()];
        apply_overrides(
            &mut inputs,
            &index,
            &[PendingOverride::new("heating", vec![Some(0.0), None])],
            false,
        );
        assert_eq!(inputs, vec![0.0, 0.0, 0.0, 0.0, 1.0]);
    }
}
