use crate::domain::batch::WriteBatch;
use crate::domain::phid::Phid;
use crate::domain::ports::StoreHandle;
use crate::error::Result;
use tracing::info;

/// Permanently removes objects together with everything hanging off them:
/// transactions, owned unique keys (slugs, names) and edges in both
/// directions.
#[derive(Clone)]
pub struct DestructionEngine {
    store: StoreHandle,
}

impl DestructionEngine {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Returns `false` if there was nothing to destroy.
    pub async fn destroy(&self, phid: &Phid) -> Result<bool> {
        let txn = self.store.begin_write().await?;
        let Some(record) = txn.object(phid).await? else {
            return Ok(false);
        };
        let mut batch = WriteBatch::new();
        batch.destroy(phid);
        txn.commit(batch).await?;
        info!(object = %phid, kind = %record.kind, "destroyed object");
        Ok(true)
    }
}
