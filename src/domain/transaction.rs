use super::edge::{EdgeSpec, EdgeType};
use super::phid::Phid;
use super::policy::Capability;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a transaction.
///
/// Built-in types are shared by every object kind; `Custom` tags are resolved
/// against the object kind's handler registry (e.g. `project.name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TransactionType {
    ViewPolicy,
    EditPolicy,
    JoinPolicy,
    Comment,
    Edge(EdgeType),
    Custom(String),
}

impl TransactionType {
    pub fn tag(&self) -> String {
        match self {
            TransactionType::ViewPolicy => "core.view-policy".to_string(),
            TransactionType::EditPolicy => "core.edit-policy".to_string(),
            TransactionType::JoinPolicy => "core.join-policy".to_string(),
            TransactionType::Comment => "core.comment".to_string(),
            TransactionType::Edge(edge) => format!("core.edge:{}", edge.name()),
            TransactionType::Custom(tag) => tag.clone(),
        }
    }

    pub fn parse(tag: &str) -> Result<Self, String> {
        match tag {
            "core.view-policy" => Ok(TransactionType::ViewPolicy),
            "core.edit-policy" => Ok(TransactionType::EditPolicy),
            "core.join-policy" => Ok(TransactionType::JoinPolicy),
            "core.comment" => Ok(TransactionType::Comment),
            _ => {
                if let Some(edge) = tag.strip_prefix("core.edge:") {
                    return EdgeType::from_name(edge)
                        .map(TransactionType::Edge)
                        .ok_or_else(|| format!("unknown edge type \"{edge}\""));
                }
                if tag.starts_with("core.") {
                    return Err(format!("unknown built-in transaction type \"{tag}\""));
                }
                match tag.split_once('.') {
                    Some((kind, field)) if !kind.is_empty() && !field.is_empty() => {
                        Ok(TransactionType::Custom(tag.to_string()))
                    }
                    _ => Err(format!("transaction type \"{tag}\" must look like kind.field")),
                }
            }
        }
    }

    /// The capability whose policy a policy transaction edits.
    pub fn policy_capability(&self) -> Option<Capability> {
        match self {
            TransactionType::ViewPolicy => Some(Capability::View),
            TransactionType::EditPolicy => Some(Capability::Edit),
            TransactionType::JoinPolicy => Some(Capability::Join),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl TryFrom<String> for TransactionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransactionType> for String {
    fn from(value: TransactionType) -> Self {
        value.tag()
    }
}

/// How an edit originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Web,
    Api,
    Email,
    Console,
    Daemon,
    #[default]
    Unknown,
}

/// Comment text attached to a submitted transaction. It can be revised until
/// the transaction is persisted; afterwards it becomes a [`TransactionComment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CommentDraft {
    content: String,
    version: u32,
}

impl CommentDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            version: 1,
        }
    }

    pub fn revise(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.version += 1;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    fn publish(self) -> TransactionComment {
        TransactionComment {
            content: self.content,
            version: self.version,
        }
    }
}

impl From<String> for CommentDraft {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<CommentDraft> for String {
    fn from(value: CommentDraft) -> Self {
        value.content
    }
}

/// Persisted comment; no mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionComment {
    content: String,
    version: u32,
}

impl TransactionComment {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

/// A proposed change as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentDraft>,
}

impl TransactionDraft {
    pub fn new(r#type: impl Into<TransactionType>, value: impl Into<Value>) -> Self {
        Self {
            r#type: r#type.into(),
            value: value.into(),
            comment: None,
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            r#type: TransactionType::Comment,
            value: Value::Null,
            comment: Some(CommentDraft::new(text)),
        }
    }

    pub fn edge(edge_type: EdgeType, spec: EdgeSpec) -> Self {
        Self::new(TransactionType::Edge(edge_type), spec.to_value())
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(CommentDraft::new(text));
        self
    }
}

/// A transaction whose effective old and new values have been computed but
/// which has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub r#type: TransactionType,
    pub old_value: Value,
    pub new_value: Value,
    pub comment: Option<CommentDraft>,
}

impl PendingTransaction {
    pub fn has_comment(&self) -> bool {
        self.comment.as_ref().is_some_and(|c| !c.is_blank())
    }
}

/// Metadata stamped onto a pending transaction when it is committed.
#[derive(Debug, Clone)]
pub struct TransactionStamp {
    pub phid: Phid,
    pub object_phid: Phid,
    pub author_phid: Phid,
    pub content_source: ContentSource,
    pub sequence: u64,
    pub created_at: u64,
}

/// Immutable record of one field-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub phid: Phid,
    pub object_phid: Phid,
    pub author_phid: Phid,
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    pub old_value: Value,
    pub new_value: Value,
    pub comment: Option<TransactionComment>,
    pub content_source: ContentSource,
    pub sequence: u64,
    pub created_at: u64,
    /// Display-only flag; the only field that may change after commit.
    #[serde(default)]
    pub hidden: bool,
}

impl Transaction {
    pub fn from_pending(pending: PendingTransaction, stamp: TransactionStamp) -> Self {
        Self {
            phid: stamp.phid,
            object_phid: stamp.object_phid,
            author_phid: stamp.author_phid,
            r#type: pending.r#type,
            old_value: pending.old_value,
            new_value: pending.new_value,
            comment: pending.comment.map(CommentDraft::publish),
            content_source: stamp.content_source,
            sequence: stamp.sequence,
            created_at: stamp.created_at,
            hidden: false,
        }
    }

    pub fn has_comment(&self) -> bool {
        self.comment.is_some()
    }
}

/// A rejected change. Produced during validation, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub transaction_type: TransactionType,
    pub title: String,
    pub message: String,
    pub value: Option<Value>,
    pub is_missing_field: bool,
}

impl ValidationError {
    pub fn required(transaction_type: TransactionType, message: impl Into<String>) -> Self {
        Self {
            transaction_type,
            title: "Required".to_string(),
            message: message.into(),
            value: None,
            is_missing_field: true,
        }
    }

    pub fn invalid(
        transaction_type: TransactionType,
        message: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        Self {
            transaction_type,
            title: "Invalid".to_string(),
            message: message.into(),
            value,
            is_missing_field: false,
        }
    }

    pub fn duplicate(
        transaction_type: TransactionType,
        message: impl Into<String>,
        value: Option<Value>,
    ) -> Self {
        Self {
            title: "Duplicate".to_string(),
            ..Self::invalid(transaction_type, message, value)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.transaction_type, self.title, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_round_trip() {
        for tag in [
            "core.view-policy",
            "core.edit-policy",
            "core.join-policy",
            "core.comment",
            "core.edge:project.member",
            "project.name",
        ] {
            assert_eq!(TransactionType::parse(tag).unwrap().tag(), tag);
        }
    }

    #[test]
    fn test_type_parse_errors() {
        assert!(TransactionType::parse("core.bogus").is_err());
        assert!(TransactionType::parse("core.edge:nope").is_err());
        assert!(TransactionType::parse("name").is_err());
        assert!(TransactionType::parse(".name").is_err());
    }

    #[test]
    fn test_draft_deserializes_from_script_json() {
        let draft: TransactionDraft =
            serde_json::from_str(r#"{"type": "project.name", "value": "Apollo"}"#).unwrap();
        assert_eq!(draft.r#type, TransactionType::Custom("project.name".into()));
        assert_eq!(draft.value, Value::text("Apollo"));
        assert!(draft.comment.is_none());

        let comment: TransactionDraft =
            serde_json::from_str(r#"{"type": "core.comment", "comment": "hi"}"#).unwrap();
        assert_eq!(comment.comment.unwrap().content(), "hi");
    }

    #[test]
    fn test_comment_revisions_bump_version() {
        let mut draft = CommentDraft::new("first");
        draft.revise("second");
        assert_eq!(draft.content(), "second");
        assert_eq!(draft.version(), 2);
    }
}
