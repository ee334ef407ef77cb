// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Archival of the artifacts produced by a session.

mod directory;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use tracing::{debug, info};
use url::Url;

use cosim_types::config::ArchiveOptions;

pub use directory::archive_directory;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid archive destination '{destination}': {reason}")]
    InvalidDestination { destination: String, reason: String },
    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Long term storage of session artifacts.
pub trait ArchiveStorage: Send + Sync + 'static {
    /// Stores `payload` under `key`, replacing any existing object. Keys are `/` separated.
    fn upload(
        &self,
        key: &str,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), ArchiveError>> + Send;
}

/// [`ArchiveStorage`] backed by an object store. Keys are resolved below the path of the
/// destination URL.
#[derive(Clone)]
pub struct ObjectStoreArchive {
    object_store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStoreArchive {
    pub fn new(object_store: Arc<dyn ObjectStore>, prefix: ObjectPath) -> Self {
        Self {
            object_store,
            prefix,
        }
    }

    pub fn from_options(options: &ArchiveOptions) -> Result<Self, ArchiveError> {
        let invalid = |reason: String| ArchiveError::InvalidDestination {
            destination: options.destination.clone(),
            reason,
        };

        let mut destination = Url::parse(&options.destination).map_err(|e| invalid(e.to_string()))?;
        // Prevent passing configuration options to object_store via the destination URL.
        destination
            .query()
            .inspect(|params| info!("Archive destination parameters ignored: {params}"));
        destination.set_query(None);

        let (object_store, prefix) =
            object_store::parse_url(&destination).map_err(|e| invalid(e.to_string()))?;
        debug!(%destination, %prefix, "Created archive object store");

        Ok(Self::new(Arc::from(object_store), prefix))
    }

    fn object_path(&self, key: &str) -> ObjectPath {
        let key = ObjectPath::from(key);
        ObjectPath::from_iter(self.prefix.parts().chain(key.parts()))
    }
}

impl ArchiveStorage for ObjectStoreArchive {
    async fn upload(&self, key: &str, payload: Bytes) -> Result<(), ArchiveError> {
        let path = self.object_path(key);
        debug!(%path, size = payload.len(), "Uploading archive object");
        self.object_store
            .put(&path, PutPayload::from_bytes(payload))
            .await?;
        Ok(())
    }
}
