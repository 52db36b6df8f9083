use super::edge::EdgeType;
use super::effect::SearchDocument;
use super::phid::Phid;
use super::policy::{Capability, Policy, PolicyObject};
use crate::error::{AttachmentError, StorageError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A `(index, key)` pair that at most one object may own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueKey {
    pub index: String,
    pub key: String,
}

impl UniqueKey {
    pub fn new(index: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            key: key.into(),
        }
    }

    /// Key whose value is numbered within a scope, e.g. milestones of a parent.
    pub fn scoped(index: impl Into<String>, scope: &str, number: u32) -> Self {
        Self::new(index, format!("{scope}/{number:08}"))
    }
}

impl fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.key)
    }
}

/// An object the transaction pipeline can edit.
///
/// Row data is the serde form of the object; attached relations are skipped
/// during serialization and reloaded from the store.
pub trait EditableObject:
    PolicyObject + Clone + fmt::Debug + Serialize + DeserializeOwned + 'static
{
    /// Stored in the object row and used to pick the right decoder.
    const KIND: &'static str;
    /// PHID type constant, e.g. `PROJ`.
    const PHID_TYPE: &'static str;

    fn phid(&self) -> &Phid;
    fn author_phid(&self) -> &Phid;
    fn display_name(&self) -> String;

    /// Returns `false` if the object has no policy for `capability`.
    fn set_policy(&mut self, capability: Capability, policy: Policy) -> bool;

    /// Called after an edge transaction is applied so attached edge sets stay
    /// in step with the store.
    fn edges_changed(&mut self, _edge_type: EdgeType, _destinations: &BTreeSet<Phid>) {}

    /// Complete set of unique keys the object row owns.
    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    fn search_document(&self) -> SearchDocument;

    /// Fills derived fields right before the row is written.
    fn prepare_persist(&mut self) -> Result<(), AttachmentError> {
        Ok(())
    }
}

/// Stored form of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub phid: Phid,
    pub kind: String,
    pub name: String,
    pub keys: Vec<UniqueKey>,
    pub data: serde_json::Value,
}

impl ObjectRecord {
    pub fn from_object<O: EditableObject>(object: &O) -> Result<Self, StorageError> {
        Ok(Self {
            phid: object.phid().clone(),
            kind: O::KIND.to_string(),
            name: object.display_name(),
            keys: object.unique_keys(),
            data: serde_json::to_value(object)?,
        })
    }

    pub fn decode<O: EditableObject>(&self) -> Result<O, StorageError> {
        if self.kind != O::KIND {
            return Err(StorageError::Corrupt(format!(
                "{} is a {}, not a {}",
                self.phid,
                self.kind,
                O::KIND
            )));
        }
        Ok(serde_json::from_value(self.data.clone())?)
    }
}
