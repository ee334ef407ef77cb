// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers of the entities handled by the worker: sites, points and finished simulations.

use std::borrow::Borrow;
use std::str::FromStr;

use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            derive_more::Display,
            derive_more::From,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifies a site, i.e. one simulated building model. A site runs at most one session at
    /// a time, so the site id also identifies the session in the shared state store and on the
    /// control channel.
    SiteId
);

string_id!(
    /// Identifies a logical point (an input that can be overridden or an output that is reported)
    /// of a site.
    PointId
);

/// Identifies one completed simulation in the sessions history.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    derive_more::From,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(transparent)]
pub struct SimulationId(Uuid);

impl SimulationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SimulationId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for SimulationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_display_their_content() {
        let site = SiteId::from("site-1");
        assert_eq!(site.to_string(), "site-1");
        assert_eq!(site.as_str(), "site-1");
        assert_eq!(PointId::new(String::from("p")).as_str(), "p");
    }

    #[test]
    fn simulation_id_parses_its_display_form() {
        let id = SimulationId::new();
        let parsed: SimulationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SimulationId>().is_err());
    }
}
