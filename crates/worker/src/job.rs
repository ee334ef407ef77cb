// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Decoding of the job messages received by the worker.

use jiff::civil::DateTime;
use serde::Deserialize;
use tracing::{debug, info};

use cosim_types::identifiers::SiteId;

const INVOKE_ACTION: &str = "InvokeAction";
const RUN_SITE: &str = "runSite";
const ADD_SITE: &str = "addSite";

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("malformed job message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job message misses '{0}'")]
    MissingField(&'static str),
    #[error("invalid '{field}' value '{value}': {source}")]
    InvalidDatetime {
        field: &'static str,
        value: String,
        #[source]
        source: jiff::Error,
    },
    #[error("session end {end} is before its start {start}")]
    InvalidWindow { start: DateTime, end: DateTime },
}

/// Request to run a stepping session for a site.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSiteRequest {
    pub site_id: SiteId,
    pub start: DateTime,
    pub end: DateTime,
    /// Requests an internally clocked session. Sessions are always externally clocked, the flag
    /// is only reported.
    pub realtime: bool,
    pub timescale: Option<f64>,
}

/// A decoded job message.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    RunSite(RunSiteRequest),
    /// A job this worker does not handle.
    Ignored {
        op: String,
        action: Option<String>,
    },
}

/// Booleans and numbers are sent either as JSON values or as their text form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_bool(&self) -> bool {
        match self {
            Loose::Bool(value) => *value,
            Loose::Number(value) => *value != 0.0,
            Loose::Text(value) => value.eq_ignore_ascii_case("true"),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Bool(_) => None,
            Loose::Number(value) => Some(*value),
            Loose::Text(value) => value.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobMessage {
    op: String,
    action: Option<String>,
    id: Option<String>,
    start_datetime: Option<String>,
    end_datetime: Option<String>,
    realtime: Option<Loose>,
    timescale: Option<Loose>,
}

fn parse_datetime(field: &'static str, value: Option<String>) -> Result<DateTime, JobError> {
    let value = value.ok_or(JobError::MissingField(field))?;
    value
        .trim()
        .parse()
        .map_err(|source| JobError::InvalidDatetime {
            field,
            value,
            source,
        })
}

impl Job {
    pub fn decode(payload: &[u8]) -> Result<Self, JobError> {
        let message: JobMessage = serde_json::from_slice(payload)?;
        debug!(op = %message.op, action = ?message.action, "Decoding job message");

        if message.op != INVOKE_ACTION || message.action.as_deref() != Some(RUN_SITE) {
            if message.action.as_deref() == Some(ADD_SITE) {
                info!("Model upload ingestion is not handled by this worker");
            }
            return Ok(Job::Ignored {
                op: message.op,
                action: message.action,
            });
        }

        let site_id = message
            .id
            .filter(|id| !id.is_empty())
            .map(SiteId::from)
            .ok_or(JobError::MissingField("id"))?;
        let start = parse_datetime("startDatetime", message.start_datetime)?;
        let end = parse_datetime("endDatetime", message.end_datetime)?;
        if end < start {
            return Err(JobError::InvalidWindow { start, end });
        }

        Ok(Job::RunSite(RunSiteRequest {
            site_id,
            start,
            end,
            realtime: message.realtime.as_ref().is_some_and(Loose::as_bool),
            timescale: message.timescale.as_ref().and_then(Loose::as_f64),
        }))
    }
}
