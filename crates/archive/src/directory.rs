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

use bytes::Bytes;
use tracing::debug;

use crate::{ArchiveError, ArchiveStorage};

/// Uploads every regular file below `dir` to `<key_prefix>/<relative path>`. Returns the number
/// of uploaded files. Symbolic links and other special files are skipped.
pub async fn archive_directory<A: ArchiveStorage>(
    storage: &A,
    dir: &Path,
    key_prefix: &str,
) -> Result<usize, ArchiveError> {
    let io_error = |path: &Path| {
        let path = path.to_owned();
        move |source| ArchiveError::Io { path, source }
    };

    let mut uploaded = 0;
    let mut pending: Vec<PathBuf> = vec![dir.to_owned()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .map_err(io_error(&current))?;

        while let Some(entry) = entries.next_entry().await.map_err(io_error(&current))? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(io_error(&path))?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %path.display(), "Skipping special file");
                continue;
            }

            let key = object_key(key_prefix, dir, &path);
            let content = tokio::fs::read(&path).await.map_err(io_error(&path))?;
            storage.upload(&key, Bytes::from(content)).await?;
            uploaded += 1;
        }
    }

    debug!(dir = %dir.display(), %key_prefix, "Archived {uploaded} files");
    Ok(uploaded)
}

fn object_key(key_prefix: &str, root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let mut key = key_prefix.trim_end_matches('/').to_owned();
    for component in relative.components() {
        if !key.is_empty() {
            key.push('/');
        }
        key.push_str(&component.as_os_str().to_string_lossy());
    }
    key
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use object_store::ObjectStore;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;

    use crate::ObjectStoreArchive;

    use super::*;

    #[test]
    fn keys_use_forward_slashes() {
        let root = Path::new("/work/site-1");
        assert_eq!(
            object_key("simulated/site-1/abc", root, &root.join("run/eplusout.csv")),
            "simulated/site-1/abc/run/eplusout.csv"
        );
        assert_eq!(object_key("", root, &root.join("a.txt")), "a.txt");
    }

    #[test_log::test(tokio::test)]
    async fn uploads_nested_files() {
        let work_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(work_dir.path().join("run/reports")).unwrap();
        std::fs::write(work_dir.path().join("in.idf"), "model").unwrap();
        std::fs::write(work_dir.path().join("run/out.csv"), "1,2").unwrap();
        std::fs::write(work_dir.path().join("run/reports/table.html"), "<html/>").unwrap();
        std::fs::create_dir_all(work_dir.path().join("empty")).unwrap();

        let store = Arc::new(InMemory::new());
        let archive = ObjectStoreArchive::new(store.clone(), ObjectPath::default());

        let uploaded = archive_directory(&archive, work_dir.path(), "simulated/site-1/sim")
            .await
            .unwrap();
        assert_eq!(uploaded, 3);

        let mut objects = BTreeMap::new();
        for key in [
            "simulated/site-1/sim/in.idf",
            "simulated/site-1/sim/run/out.csv",
            "simulated/site-1/sim/run/reports/table.html",
        ] {
            let bytes = store
                .get(&ObjectPath::from(key))
                .await
                .unwrap()
                .bytes()
                .await
                .unwrap();
            objects.insert(key, bytes);
        }
        assert_eq!(objects["simulated/site-1/sim/in.idf"], "model");
        assert_eq!(objects["simulated/site-1/sim/run/reports/table.html"], "<html/>");
    }

    #[test_log::test(tokio::test)]
    async fn missing_directory_is_an_io_error() {
        let archive = ObjectStoreArchive::new(Arc::new(InMemory::new()), ObjectPath::default());
        assert!(matches!(
            archive_directory(&archive, Path::new("/nonexistent/cosim"), "x").await,
            Err(ArchiveError::Io { .. })
        ));
    }
}
