// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Declarative inputs of the variable index: the point mapping produced by the model preparation
//! and the variable catalog declared by the engine.

use serde::{Deserialize, Serialize};

use cosim_types::identifiers::PointId;

/// Binding of points to engine variables. Serialized as a JSON array of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping(pub Vec<MappingEntry>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub id: PointId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    pub variable: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputBinding {
    /// Key of the output variable, e.g. `EMS` or a zone name.
    pub variable: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl MappingEntry {
    pub fn input(id: impl Into<PointId>, variable: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: Some(InputBinding {
                variable: variable.into(),
                kind: None,
            }),
            output: None,
        }
    }

    pub fn output(id: impl Into<PointId>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: None,
            output: Some(OutputBinding {
                variable: name.into(),
                kind: kind.into(),
            }),
        }
    }
}

/// Variables exchanged with the engine, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableCatalog {
    /// Input variable names. Each one occupies a value slot and an enable slot.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<OutputVariable>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OutputVariable {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }
}
