//! JSON-file durable store
//!
//! Layout: `<dir>/<tool>/<sha256 of key>.json`, one record per key.

use crate::cache::CacheKey;
use crate::error::{InspectError, InspectResult};
use crate::inspection::ToolKind;
use crate::store::DurableStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Stored record wrapping one inspection result
#[derive(Debug, Serialize, Deserialize)]
struct Record<T> {
    key: CacheKey,
    tool: ToolKind,
    stored_at: DateTime<Utc>,
    data: T,
}

/// File-backed store, safe to share between inspectors
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`, creating it if needed
    pub async fn open(dir: impl Into<PathBuf>) -> InspectResult<Self> {
        let dir = dir.into();
        create_private_dir(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, tool: ToolKind, key: &CacheKey) -> PathBuf {
        self.dir
            .join(tool.as_str())
            .join(format!("{}.json", key.hash()))
    }
}

#[async_trait]
impl<T> DurableStore<T> for FileStore
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, tool: ToolKind, key: &CacheKey) -> InspectResult<Option<T>> {
        let path = self.record_path(tool, key);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(InspectError::Store(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let record: Record<T> = serde_json::from_str(&content).map_err(|e| {
            InspectError::Store(format!("decoding {}: {}", path.display(), e))
        })?;

        if record.key != *key || record.tool != tool {
            debug!("Ignoring record {} stored for {}", path.display(), record.key);
            return Ok(None);
        }

        debug!("Loaded {} record for {} (stored {})", tool, key, record.stored_at);
        Ok(Some(record.data))
    }

    async fn set(&self, tool: ToolKind, key: &CacheKey, value: &T) -> InspectResult<()> {
        let path = self.record_path(tool, key);
        if let Some(parent) = path.parent() {
            create_private_dir(parent).await?;
        }

        let record = Record {
            key: key.clone(),
            tool,
            stored_at: Utc::now(),
            data: value,
        };
        let content = serde_json::to_string_pretty(&record)?;

        // Write beside the target and rename so readers never see a partial record
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| InspectError::Store(format!("writing {}: {}", tmp.display(), e)))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(InspectError::Store(format!(
                "replacing {}: {}",
                path.display(),
                e
            )));
        }

        debug!("Stored {} record for {}", tool, key);
        Ok(())
    }
}

async fn create_private_dir(dir: &Path) -> InspectResult<()> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| InspectError::Store(format!("creating {}: {}", dir.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        fs::set_permissions(dir, perms)
            .await
            .map_err(|e| InspectError::Store(format!("restricting {}: {}", dir.display(), e)))?;
    }

    Ok(())
}
