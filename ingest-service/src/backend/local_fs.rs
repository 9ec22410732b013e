use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::common::{Backend, BackendError, BackendResult};

/// A [`Backend`] storing objects as files below a root directory.
///
/// Object keys map to relative paths, so `sensors/abc.json` ends up at
/// `<root>/sensors/abc.json`.
#[derive(Debug)]
pub struct LocalFsBackend {
    path: PathBuf,
}

impl LocalFsBackend {
    /// Creates a backend rooted at the given directory.
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl Backend for LocalFsBackend {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn put_object(
        &self,
        key: &str,
        _content_type: &str,
        payload: Bytes,
    ) -> BackendResult<()> {
        let path = self.path.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BackendError::AlreadyExists { key: key.into() });
            }
            Err(err) => return Err(err.into()),
        };

        file.write_all(&payload).await?;
        file.flush().await?;
        file.sync_data().await?;

        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(?prefix), skip_all)]
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        // Only descend into the directory holding the prefix; the remainder is matched on names.
        let base = match prefix.rfind('/') {
            Some(index) => &prefix[..index],
            None => "",
        };

        let mut keys = Vec::new();
        let mut pending = vec![base.to_owned()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(self.path.join(&dir)).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let Ok(name) = entry.file_name().into_string() else {
                    tracing::debug!(path = ?entry.path(), "skipping non-utf8 file name");
                    continue;
                };
                let key = if dir.is_empty() {
                    name
                } else {
                    format!("{dir}/{name}")
                };

                if entry.file_type().await?.is_dir() {
                    if prefix.starts_with(&key) || key.starts_with(prefix) {
                        pending.push(key);
                    }
                } else if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    #[tracing::instrument(level = "trace", fields(?key), skip_all)]
    async fn get_object(&self, key: &str) -> BackendResult<Option<Bytes>> {
        match tokio::fs::read(self.path.join(key)).await {
            Ok(contents) => Ok(Some(contents.into())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
