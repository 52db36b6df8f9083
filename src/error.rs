use crate::domain::phid::Phid;
use crate::domain::policy::Capability;
use crate::domain::transaction::{PendingTransaction, ValidationError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<ValidationError>),
    #[error(transparent)]
    Authorization(#[from] AuthError),
    #[error("{} transaction(s) would have no effect", .0.len())]
    NoEffect(Vec<PendingTransaction>),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EditError {
    /// Per-field errors, if this is a validation failure.
    pub fn validation_errors(&self) -> &[ValidationError] {
        match self {
            EditError::Validation(errors) => errors,
            _ => &[],
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{actor} does not have the \"{capability}\" capability on {object}")]
pub struct AuthError {
    pub actor: Phid,
    pub object: Phid,
    pub capability: Capability,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unique key {index}:{key} is already held by {owner}")]
    UniqueViolation {
        index: String,
        key: String,
        owner: Phid,
    },
    #[error("edge {edge_type} from {src} allows a single destination")]
    CardinalityViolation { src: Phid, edge_type: String },
    #[error("record is corrupt: {0}")]
    Corrupt(String),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{what} was not loaded before use")]
pub struct AttachmentError {
    pub what: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("handler for \"{0}\" registered twice")]
    DuplicateHandler(String),
}

/// Failures of best-effort, post-commit work. Never returned from the edit
/// pipeline itself.
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("mail delivery failed: {0}")]
    Mail(String),
    #[error("feed publish failed: {0}")]
    Feed(String),
    #[error("search indexing failed: {0}")]
    Search(String),
    #[error("index rebuild failed: {0}")]
    Index(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("IO error reading script: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid edit script: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T, E = EditError> = std::result::Result<T, E>;
