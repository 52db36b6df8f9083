use super::batch::WriteBatch;
use super::edge::EdgeType;
use super::effect::{FeedStory, MailMessage, SearchDocument};
use super::object::{ObjectRecord, UniqueKey};
use super::phid::Phid;
use super::policy::{Actor, Capability, CapabilityCheck, PolicyObject};
use super::transaction::Transaction;
use crate::error::{AuthError, EffectError, StorageError};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read access to committed state.
#[async_trait]
pub trait StoreRead: Send + Sync {
    async fn object(&self, phid: &Phid) -> Result<Option<ObjectRecord>, StorageError>;
    /// Transactions of an object in commit order.
    async fn transactions(&self, object: &Phid) -> Result<Vec<Transaction>, StorageError>;
    async fn edge_destinations(
        &self,
        src: &Phid,
        edge_type: EdgeType,
    ) -> Result<BTreeSet<Phid>, StorageError>;
    async fn key_owner(&self, index: &str, key: &str) -> Result<Option<Phid>, StorageError>;
    async fn keys_owned(&self, index: &str, owner: &Phid) -> Result<Vec<String>, StorageError>;
    /// Every key `owner` holds, across all indexes.
    async fn keys_owned_by(&self, owner: &Phid) -> Result<Vec<UniqueKey>, StorageError>;
    /// Highest number among keys of the form `<scope>/<number>` in `index`.
    async fn max_scoped_number(&self, index: &str, scope: &str)
    -> Result<Option<u32>, StorageError>;
}

/// An exclusive write connection. Dropping it without committing discards
/// nothing but the lock.
#[async_trait]
pub trait WriteTxn: StoreRead {
    async fn commit(self: Box<Self>, batch: WriteBatch) -> Result<(), StorageError>;
}

#[async_trait]
pub trait Store: StoreRead {
    /// Waits for any other writer to finish.
    async fn begin_write(&self) -> Result<Box<dyn WriteTxn>, StorageError>;
}

pub type StoreHandle = Arc<dyn Store>;

pub trait Authorizer: CapabilityCheck {
    fn require_capability(
        &self,
        actor: &Actor,
        object: &dyn PolicyObject,
        capability: Capability,
    ) -> Result<(), AuthError> {
        if self.has_capability(actor, object, capability) {
            Ok(())
        } else {
            Err(AuthError {
                actor: actor.phid().clone(),
                object: object.policy_phid().clone(),
                capability,
            })
        }
    }
}

#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), EffectError>;
}

#[async_trait]
pub trait FeedSink: Send + Sync {
    async fn publish(&self, story: &FeedStory) -> Result<(), EffectError>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, document: &SearchDocument) -> Result<(), EffectError>;
}

/// Rebuilds derived membership after structural project edits.
#[async_trait]
pub trait MembershipIndex: Send + Sync {
    async fn rematerialize(&self, project: &Phid) -> Result<(), EffectError>;
}
