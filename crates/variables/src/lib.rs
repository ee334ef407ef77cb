// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Resolution of logical point ids to the positional input and output slots of the engine.
//!
//! The input vector holds a `(value, enable)` pair per catalog input followed by a single master
//! enable slot, so `n` inputs yield a vector of `2 * n + 1` slots. Outputs are addressed by their
//! catalog position.

mod mapping;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use cosim_types::identifiers::PointId;

pub use mapping::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Immutable lookup tables built once per session.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    input_slots: usize,
    master_enable_variable: String,
    inputs_by_variable: HashMap<String, usize>,
    input_points: BTreeMap<PointId, String>,
    outputs_by_kind: HashMap<String, HashMap<String, usize>>,
    output_slots: usize,
    output_points: BTreeMap<PointId, OutputBinding>,
}

impl VariableIndex {
    pub fn new(mapping: Mapping, catalog: VariableCatalog, master_enable_variable: &str) -> Self {
        let mut inputs_by_variable = HashMap::with_capacity(catalog.inputs.len());
        let mut position = 0;
        for variable in catalog.inputs {
            if variable == master_enable_variable {
                debug!("Catalog lists the master enable variable '{variable}', using the trailing slot");
                continue;
            }
            if inputs_by_variable.contains_key(&variable) {
                warn!("Input variable '{variable}' is declared more than once, keeping the first declaration");
                continue;
            }
            inputs_by_variable.insert(variable, 2 * position);
            position += 1;
        }
        let input_slots = 2 * position + 1;

        let output_slots = catalog.outputs.len();
        let mut outputs_by_kind: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (idx, OutputVariable { name, kind }) in catalog.outputs.into_iter().enumerate() {
            outputs_by_kind
                .entry(kind)
                .or_default()
                .entry(name)
                .or_insert(idx);
        }

        let mut input_points = BTreeMap::new();
        let mut output_points = BTreeMap::new();
        for MappingEntry { id, input, output } in mapping.0 {
            if let Some(input) = input {
                if !inputs_by_variable.contains_key(&input.variable) {
                    warn!(
                        "Point '{id}' is bound to the unknown input variable '{}'",
                        input.variable
                    );
                }
                input_points.insert(id.clone(), input.variable);
            }
            if let Some(output) = output {
                if !outputs_by_kind
                    .get(&output.kind)
                    .is_some_and(|names| names.contains_key(&output.variable))
                {
                    warn!(
                        "Point '{id}' is bound to the unknown output variable ({}, {})",
                        output.kind, output.variable
                    );
                }
                output_points.insert(id, output);
            }
        }

        Self {
            input_slots,
            master_enable_variable: master_enable_variable.to_owned(),
            inputs_by_variable,
            input_points,
            outputs_by_kind,
            output_slots,
            output_points,
        }
    }

    /// Reads the JSON mapping and catalog files produced by the model preparation.
    pub fn from_files(
        mapping_path: impl AsRef<Path>,
        catalog_path: impl AsRef<Path>,
        master_enable_variable: &str,
    ) -> Result<Self, Error> {
        let mapping: Mapping = read_json(mapping_path.as_ref())?;
        let catalog: VariableCatalog = read_json(catalog_path.as_ref())?;
        Ok(Self::new(mapping, catalog, master_enable_variable))
    }

    /// Number of slots of the input vector.
    pub fn input_len(&self) -> usize {
        self.input_slots
    }

    /// Number of slots of the output vector.
    pub fn output_len(&self) -> usize {
        self.output_slots
    }

    /// Index of the master enable slot, always the trailing input slot.
    pub fn master_enable_index(&self) -> usize {
        self.input_slots - 1
    }

    /// Value slot of an input variable. The following slot is its enable flag, except for the
    /// master enable variable which has none.
    pub fn input_index_by_variable(&self, variable: &str) -> Option<usize> {
        if variable == self.master_enable_variable {
            return Some(self.master_enable_index());
        }
        self.inputs_by_variable.get(variable).copied()
    }

    /// Value slot of the input bound to the given point.
    pub fn input_index(&self, point_id: &str) -> Option<usize> {
        self.input_points
            .get(point_id)
            .and_then(|variable| self.inputs_by_variable.get(variable))
            .copied()
    }

    pub fn output_index_by_kind_and_name(&self, kind: &str, name: &str) -> Option<usize> {
        self.outputs_by_kind
            .get(kind)
            .and_then(|names| names.get(name))
            .copied()
    }

    /// Output slot of the variable bound to the given point.
    pub fn output_index(&self, point_id: &str) -> Option<usize> {
        self.output_points
            .get(point_id)
            .and_then(|binding| self.output_index_by_kind_and_name(&binding.kind, &binding.variable))
    }

    /// Ids of all points declaring an input binding, in id order.
    pub fn input_ids(&self) -> impl Iterator<Item = &PointId> {
        self.input_points.keys()
    }

    /// Ids of all points declaring an output binding, in id order.
    pub fn output_ids(&self) -> impl Iterator<Item = &PointId> {
        self.output_points.keys()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let content = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&content).map_err(|source| Error::Json {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use test_log::test;

    use super::*;

    fn catalog() -> VariableCatalog {
        VariableCatalog {
            inputs: vec!["SP_Zone1".into(), "SP_Zone2".into(), "Fan_Speed".into()],
            outputs: vec![
                OutputVariable::new("current_month", "EMS"),
                OutputVariable::new("current_day", "EMS"),
                OutputVariable::new("current_hour", "EMS"),
                OutputVariable::new("current_minute", "EMS"),
                OutputVariable::new("Zone Mean Air Temperature", "Zone1"),
            ],
        }
    }

    fn mapping() -> Mapping {
        Mapping(vec![
            MappingEntry::input("zone1-sp", "SP_Zone1"),
            MappingEntry::input("zone2-sp", "SP_Zone2"),
            MappingEntry::input("fan", "Fan_Speed"),
            MappingEntry::output("zone1-temp", "Zone Mean Air Temperature", "Zone1"),
        ])
    }

    #[test]
    fn input_vector_layout() {
        let index = VariableIndex::new(mapping(), catalog(), "MasterEnable");

        assert_that!(index.input_len(), eq(7));
        assert_that!(index.master_enable_index(), eq(6));
        assert_that!(index.input_index_by_variable("MasterEnable"), some(eq(6)));
        assert_that!(index.input_index("zone1-sp"), some(eq(0)));
        assert_that!(index.input_index("zone2-sp"), some(eq(2)));
        assert_that!(index.input_index("fan"), some(eq(4)));
    }

    #[test]
    fn every_declared_input_resolves() {
        let index = VariableIndex::new(mapping(), catalog(), "MasterEnable");

        let ids: Vec<_> = index.input_ids().cloned().collect();
        assert_that!(ids.len(), eq(3));
        for id in &ids {
            assert_that!(index.input_index(id.as_str()), some(anything()));
        }
    }

    #[test]
    fn unknown_points_are_not_found() {
        let index = VariableIndex::new(mapping(), catalog(), "MasterEnable");

        assert_that!(index.input_index("nope"), none());
        assert_that!(index.output_index("nope"), none());
        assert_that!(index.output_index_by_kind_and_name("current_month", "Zone1"), none());
        // output points have no input slot and vice versa
        assert_that!(index.input_index("zone1-temp"), none());
        assert_that!(index.output_index("fan"), none());
    }

    #[test]
    fn outputs_by_kind_and_name() {
        let index = VariableIndex::new(mapping(), catalog(), "MasterEnable");

        assert_that!(index.output_len(), eq(5));
        assert_that!(
            index.output_index_by_kind_and_name("current_minute", "EMS"),
            some(eq(3))
        );
        assert_that!(index.output_index("zone1-temp"), some(eq(4)));
        assert_that!(
            index.output_ids().map(PointId::as_str).collect::<Vec<_>>(),
            elements_are![eq(&"zone1-temp")]
        );
    }

    #[test]
    fn dangling_bindings_are_kept_but_unresolved() {
        let mut mapping = mapping();
        mapping.0.push(MappingEntry::input("ghost", "Not_In_Catalog"));
        let index = VariableIndex::new(mapping, catalog(), "MasterEnable");

        assert_that!(index.input_ids().count(), eq(4));
        assert_that!(index.input_index("ghost"), none());
    }

    #[test]
    fn master_enable_in_catalog_does_not_take_a_pair() {
        let mut catalog = catalog();
        catalog.inputs.push("MasterEnable".into());
        let index = VariableIndex::new(mapping(), catalog, "MasterEnable");

        assert_that!(index.input_len(), eq(7));
        assert_that!(index.input_index_by_variable("MasterEnable"), some(eq(6)));
    }

    #[test]
    fn from_files() {
        let dir = tempfile::tempdir().unwrap();
        let mapping_path = dir.path().join("mapping.json");
        let catalog_path = dir.path().join("catalog.json");
        std::fs::write(
            &mapping_path,
            r#"[
                {"id": "zone1-sp", "input": {"variable": "SP_Zone1", "type": "schedule"}},
                {"id": "zone1-temp", "output": {"variable": "Zone1", "type": "Zone Mean Air Temperature"}}
            ]"#,
        )
        .unwrap();
        std::fs::write(
            &catalog_path,
            r#"{
                "inputs": ["SP_Zone1"],
                "outputs": [{"name": "Zone1", "type": "Zone Mean Air Temperature"}]
            }"#,
        )
        .unwrap();

        let index = VariableIndex::from_files(&mapping_path, &catalog_path, "MasterEnable").unwrap();
        assert_that!(index.input_len(), eq(3));
        assert_that!(index.input_index("zone1-sp"), some(eq(0)));
        assert_that!(index.output_index("zone1-temp"), some(eq(0)));

        std::fs::write(&catalog_path, "{ not json").unwrap();
        assert_that!(
            VariableIndex::from_files(&mapping_path, &catalog_path, "MasterEnable"),
            err(pat!(Error::Json { .. }))
        );
        assert_that!(
            VariableIndex::from_files(dir.path().join("missing.json"), &catalog_path, "MasterEnable"),
            err(pat!(Error::Io { .. }))
        );
    }
}
