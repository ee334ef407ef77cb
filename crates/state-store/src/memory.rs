// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use cosim_types::identifiers::{PointId, SiteId};
use cosim_types::records::{
    PendingOverride, PointRecord, PointStatus, SessionRecord, SessionUpdate, SimStatus,
    SimulationRecord,
};

use crate::{Result, StateStore, StoreError};

#[derive(Default)]
struct Inner {
    sessions: HashMap<SiteId, SessionRecord>,
    points: BTreeMap<PointId, PointRecord>,
    overrides: HashMap<SiteId, BTreeMap<PointId, Vec<Option<f64>>>>,
    simulations: Vec<SimulationRecord>,
    #[cfg(any(test, feature = "test-util"))]
    unavailable: bool,
}

impl Inner {
    #[cfg(any(test, feature = "test-util"))]
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("state store is offline".into()));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn check_available(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process [`StateStore`]. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session record of a site.
    pub fn register_site(&self, site: impl Into<SiteId>, name: Option<String>) {
        self.inner.lock().sessions.insert(
            site.into(),
            SessionRecord {
                name,
                ..SessionRecord::default()
            },
        );
    }

    /// Creates the record of a point belonging to `site`.
    pub fn register_point(&self, site: impl Into<SiteId>, point: impl Into<PointId>) {
        let site = site.into();
        self.inner
            .lock()
            .points
            .insert(point.into(), PointRecord::new(site));
    }

    /// Stages values for an input point, replacing previously staged ones.
    pub fn stage_override(
        &self,
        site: impl Into<SiteId>,
        point: impl Into<PointId>,
        values: Vec<Option<f64>>,
    ) {
        self.inner
            .lock()
            .overrides
            .entry(site.into())
            .or_default()
            .insert(point.into(), values);
    }

    /// Sets the status of the session record, e.g. to request a stop.
    pub fn set_status(&self, site: &SiteId, status: SimStatus) {
        if let Some(record) = self.inner.lock().sessions.get_mut(site) {
            record.status = Some(status);
        }
    }

    pub fn point(&self, point: &PointId) -> Option<PointRecord> {
        self.inner.lock().points.get(point).cloned()
    }

    pub fn session(&self, site: &SiteId) -> Option<SessionRecord> {
        self.inner.lock().sessions.get(site).cloned()
    }

    pub fn simulations(&self) -> Vec<SimulationRecord> {
        self.inner.lock().simulations.clone()
    }

    /// Makes every following call fail with [`StoreError::Unavailable`].
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }
}

impl StateStore for MemoryStateStore {
    async fn pending_overrides(&self, site: &SiteId) -> Result<Vec<PendingOverride>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner
            .overrides
            .get(site)
            .map(|staged| {
                staged
                    .iter()
                    .map(|(point, values)| PendingOverride::new(point.clone(), values.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_point_value(
        &self,
        point: &PointId,
        value: f64,
        status: PointStatus,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        match inner.points.get_mut(point) {
            Some(record) => {
                record.value = Some(value);
                record.status = Some(status);
            }
            None => debug!(%point, "Ignoring value of unknown point"),
        }
        Ok(())
    }

    async fn update_session(&self, site: &SiteId, update: SessionUpdate) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        match inner.sessions.get_mut(site) {
            Some(record) => {
                if update.datetime.is_some() {
                    record.datetime = update.datetime;
                }
                record.step = Some(update.step);
                record.status = Some(update.status);
            }
            None => debug!(%site, "Ignoring session update of unknown site"),
        }
        Ok(())
    }

    async fn session_record(&self, site: &SiteId) -> Result<Option<SessionRecord>> {
        let inner = self.inner.lock();
        inner.check_available()?;
        Ok(inner.sessions.get(site).cloned())
    }

    async fn reset_session(&self, site: &SiteId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if let Some(record) = inner.sessions.get_mut(site) {
            record.status = Some(SimStatus::Stopped);
            record.datetime = None;
            record.step = None;
        }
        for record in inner.points.values_mut().filter(|p| &p.site_id == site) {
            record.value = None;
            record.error = None;
            record.status = Some(PointStatus::Disabled);
        }
        Ok(())
    }

    async fn insert_simulation(&self, record: SimulationRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if inner.simulations.iter().any(|s| s.id == record.id) {
            return Err(StoreError::Rejected(
                format!("simulation {} already exists", record.id).into(),
            ));
        }
        inner.simulations.push(record);
        Ok(())
    }
}
