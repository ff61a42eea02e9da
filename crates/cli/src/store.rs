//! Key-value result store backed by a directory.
//!
//! `<dir>/<key>` holds the blob, `<dir>/<key>.meta.json` its content type,
//! size and store time.

use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Serialize)]
struct BlobMeta<'a> {
    content_type: &'a str,
    bytes: usize,
    stored_at: String,
}

pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(test)]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Write `data` under `key`. Returns the blob path.
    pub fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<PathBuf, String> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(format!("invalid store key '{key}'"));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("cannot create {}: {e}", self.dir.display()))?;

        let blob_path = self.dir.join(key);
        std::fs::write(&blob_path, data)
            .map_err(|e| format!("cannot write {}: {e}", blob_path.display()))?;

        let meta = BlobMeta {
            content_type,
            bytes: data.len(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        };
        let meta_json = serde_json::to_string_pretty(&meta).map_err(|e| e.to_string())?;
        let meta_path = self.dir.join(format!("{key}.meta.json"));
        std::fs::write(&meta_path, meta_json)
            .map_err(|e| format!("cannot write {}: {e}", meta_path.display()))?;

        Ok(blob_path)
    }

    /// Like [`put`](Self::put), but failures are only logged.
    pub fn put_detached(&self, key: &str, data: &[u8], content_type: &str) -> Option<PathBuf> {
        match self.put(key, data, content_type) {
            Ok(path) => {
                log::info!("saved {key} to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("store write failed for {key}: {e}");
                None
            }
        }
    }
}
