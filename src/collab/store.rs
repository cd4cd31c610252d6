//! JSON-file backed config store.

use super::ConfigStore;
use crate::context::CallContext;
use crate::error::{NodeError, Result};
use crate::model::InboundRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct InboundDocument {
    #[serde(default)]
    inbounds: Vec<InboundRecord>,
}

/// Stores inbound definitions in a single JSON document.
///
/// Writers are serialized through an async mutex. Every write replaces the
/// file atomically (temp file + rename).
pub struct JsonConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Current records in insertion order.
    pub async fn list(&self) -> Result<Vec<InboundRecord>> {
        Ok(self.load().await?.inbounds)
    }

    async fn load(&self) -> Result<InboundDocument> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(InboundDocument::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                NodeError::Store(format!("corrupt document {}: {}", self.path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InboundDocument::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, doc: &InboundDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn upsert(&self, ctx: &CallContext, record: InboundRecord) -> Result<()> {
        ctx.check()?;

        let _guard = self.write_lock.lock().await;
        let mut doc = self.load().await?;
        let key = record.key();

        match doc.inbounds.iter_mut().find(|r| r.key() == key) {
            Some(existing) if *existing == record => {
                debug!("Inbound {} unchanged", key);
                return Ok(());
            }
            Some(existing) => {
                *existing = record;
                info!("Updated inbound {}", key);
            }
            None => {
                doc.inbounds.push(record);
                info!("Created inbound {}", key);
            }
        }

        self.persist(&doc).await
    }
}
