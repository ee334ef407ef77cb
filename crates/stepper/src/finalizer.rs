// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jiff::Timestamp;
use tracing::{debug, info, warn};

use cosim_archive::{ArchiveError, ArchiveStorage, archive_directory};
use cosim_channel::CoSimClient;
use cosim_state_store::{StateStore, StoreError};
use cosim_types::config::ArchiveOptions;
use cosim_types::identifiers::{SimulationId, SiteId};
use cosim_types::records::SimulationRecord;

const UNKNOWN_NAME: &str = "Unknown";
const NAME_TAG: &str = "s:";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("cannot remove working directory '{}': {source}", path.display())]
    RemoveWorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Archives the artifacts of a session and resets the shared state of its site.
pub struct SessionFinalizer<S, A> {
    store: Arc<S>,
    archive: Arc<A>,
    options: ArchiveOptions,
}

impl<S: StateStore, A: ArchiveStorage> SessionFinalizer<S, A> {
    pub fn new(store: Arc<S>, archive: Arc<A>, options: ArchiveOptions) -> Self {
        Self {
            store,
            archive,
            options,
        }
    }

    /// Storage key of a completed simulation.
    pub fn storage_key(&self, site_id: &SiteId, simulation_id: &SimulationId) -> String {
        let prefix = self.options.key_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            format!("{site_id}/{simulation_id}")
        } else {
            format!("{prefix}/{site_id}/{simulation_id}")
        }
    }

    /// The engine is killed before anything is persisted. When archival or the history write
    /// fails, the shared state of the site is still reset and the first error is returned.
    pub async fn finalize<C: CoSimClient>(
        &self,
        client: &mut C,
        site_id: &SiteId,
        work_dir: &Path,
    ) -> Result<SimulationRecord, PersistenceError> {
        client.stop(true).await;

        match self.persist(site_id, work_dir).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if let Err(reset_err) = self.store.reset_session(site_id).await {
                    warn!(%site_id, "Cannot reset the session after a failed finalization: {reset_err}");
                }
                Err(err)
            }
        }
    }

    async fn persist(
        &self,
        site_id: &SiteId,
        work_dir: &Path,
    ) -> Result<SimulationRecord, PersistenceError> {
        let simulation_id = SimulationId::new();
        let storage_key = self.storage_key(site_id, &simulation_id);
        let archived = archive_directory(self.archive.as_ref(), work_dir, &storage_key).await?;
        info!(%storage_key, "Archived {archived} session files");

        if self.options.remove_work_dir {
            tokio::fs::remove_dir_all(work_dir)
                .await
                .map_err(|source| PersistenceError::RemoveWorkDir {
                    path: work_dir.to_owned(),
                    source,
                })?;
            debug!(work_dir = %work_dir.display(), "Removed session working directory");
        }

        let name = self
            .store
            .session_record(site_id)
            .await?
            .and_then(|record| record.name)
            .map(|name| name.strip_prefix(NAME_TAG).map(str::to_owned).unwrap_or(name))
            .unwrap_or_else(|| UNKNOWN_NAME.to_owned());

        let record = SimulationRecord {
            id: simulation_id,
            site_id: site_id.clone(),
            storage_key,
            name,
            time_completed: Timestamp::now(),
        };
        self.store.insert_simulation(record.clone()).await?;
        self.store.reset_session(site_id).await?;

        Ok(record)
    }
}
