use crate::domain::phid::Phid;
use crate::domain::policy::Actor;
use crate::domain::transaction::TransactionDraft;
use crate::error::ScriptError;
use serde::Deserialize;
use std::fmt;
use std::io::Read;

/// Object kinds a script can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Project,
    Post,
}

/// Which object a request edits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum ObjectRef {
    /// A fresh object.
    New,
    /// The object produced by an earlier request of the same script.
    Earlier(usize),
    Stored(Phid),
}

impl TryFrom<String> for ObjectRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "new" {
            return Ok(ObjectRef::New);
        }
        if let Some(index) = value.strip_prefix('@') {
            return index
                .parse()
                .map(ObjectRef::Earlier)
                .map_err(|_| format!("invalid request reference \"{value}\""));
        }
        Phid::parse(&value)
            .map(ObjectRef::Stored)
            .map_err(|e| e.to_string())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectRef::New => f.write_str("new"),
            ObjectRef::Earlier(index) => write!(f, "@{index}"),
            ObjectRef::Stored(phid) => write!(f, "{phid}"),
        }
    }
}

/// One edit: who applies which transactions to which object.
#[derive(Debug, Clone, Deserialize)]
pub struct EditRequest {
    pub kind: ObjectKind,
    pub object: ObjectRef,
    pub actor: Phid,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub transactions: Vec<TransactionDraft>,
}

impl EditRequest {
    pub fn actor(&self) -> Actor {
        if self.admin {
            Actor::admin(self.actor.clone())
        } else {
            Actor::user(self.actor.clone())
        }
    }
}

/// Reads an edit script: a JSON array of [`EditRequest`]s.
pub struct EditScriptReader<R: Read> {
    source: R,
}

impl<R: Read> EditScriptReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn requests(self) -> Result<Vec<EditRequest>, ScriptError> {
        Ok(serde_json::from_reader(self.source)?)
    }
}
