// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Access to the shared state store holding the per-site session record, the live value of every
//! point and the history of completed simulations.

mod memory;

use std::future::Future;

use cosim_types::errors::GenericError;
use cosim_types::identifiers::{PointId, SiteId};
use cosim_types::records::{
    PendingOverride, PointStatus, SessionRecord, SessionUpdate, SimulationRecord,
};

pub use memory::MemoryStateStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state store is unavailable: {0}")]
    Unavailable(#[source] GenericError),
    #[error("state store rejected the write: {0}")]
    Rejected(#[source] GenericError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Shared state of the sites, read and written by the session driving a site.
///
/// All writes are single record upserts. Writes to records that do not exist are ignored, the
/// records are created by whoever registers the site.
pub trait StateStore: Send + Sync + 'static {
    /// Values staged by callers for the input points of `site`.
    fn pending_overrides(
        &self,
        site: &SiteId,
    ) -> impl Future<Output = Result<Vec<PendingOverride>>> + Send;

    /// Sets the current value and status of an output point.
    fn upsert_point_value(
        &self,
        point: &PointId,
        value: f64,
        status: PointStatus,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Records the progress of the session running `site`.
    fn update_session(
        &self,
        site: &SiteId,
        update: SessionUpdate,
    ) -> impl Future<Output = Result<()>> + Send;

    fn session_record(
        &self,
        site: &SiteId,
    ) -> impl Future<Output = Result<Option<SessionRecord>>> + Send;

    /// Marks the session of `site` as stopped, clears its time and step, and disables every
    /// point of the site.
    fn reset_session(&self, site: &SiteId) -> impl Future<Output = Result<()>> + Send;

    /// Appends a completed simulation to the history.
    fn insert_simulation(
        &self,
        record: SimulationRecord,
    ) -> impl Future<Output = Result<()>> + Send;
}
