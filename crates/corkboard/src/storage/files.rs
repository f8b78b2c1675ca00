use async_trait::async_trait;
use corkboard_core::{FileStorage, Result, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StorageConfig;

/// In-memory blob store keyed by path.
#[derive(Clone, Default)]
pub struct MemoryFileStorage {
    bucket: String,
    public_url_base: Option<String>,
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    fail_puts: Arc<RwLock<usize>>,
}

impl MemoryFileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            public_url_base: config.public_url_base.clone(),
            ..Self::default()
        }
    }

    /// Make the next `count` uploads fail with a transport error.
    pub async fn fail_next_puts(&self, count: usize) {
        *self.fail_puts.write().await = count;
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.files.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl FileStorage for MemoryFileStorage {
    async fn put(&self, bytes: Vec<u8>, path_hint: &str) -> Result<String> {
        {
            let mut failures = self.fail_puts.write().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(StorageError::Transport(format!(
                    "upload of {} failed",
                    path_hint
                )));
            }
        }
        let mut files = self.files.write().await;
        if files.contains_key(path_hint) {
            return Err(StorageError::UniqueViolation {
                table: self.bucket.clone(),
                columns: path_hint.to_string(),
            });
        }
        debug!(
            "[MemoryFileStorage] put {} ({} bytes) in {}",
            path_hint,
            bytes.len(),
            self.bucket
        );
        files.insert(path_hint.to_string(), bytes);
        Ok(path_hint.to_string())
    }

    fn public_url(&self, path: &str) -> Option<String> {
        self.public_url_base.as_ref().map(|base| {
            format!(
                "{}/{}/{}",
                base.trim_end_matches('/'),
                self.bucket,
                path.trim_start_matches('/')
            )
        })
    }

    async fn remove(&self, path: &str) -> Result<()> {
        match self.files.write().await.remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                table: self.bucket.clone(),
                id: path.to_string(),
            }),
        }
    }
}
