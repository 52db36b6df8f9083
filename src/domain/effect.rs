//! Post-commit side effects. The editor only describes them; dispatching is
//! done separately and is best-effort.

use super::phid::Phid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub object_phid: Phid,
    pub subject: String,
    pub thread_topic: String,
    pub to: Vec<Phid>,
    pub cc: Vec<Phid>,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub is_first_message: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedStory {
    pub object_phid: Phid,
    pub author_phid: Phid,
    pub transaction_phids: Vec<Phid>,
    pub text: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub phid: Phid,
    pub kind: String,
    pub title: String,
    pub body: String,
    /// Lowercase, deduplicated typeahead tokens.
    pub tokens: Vec<String>,
}

impl SearchDocument {
    pub fn tokenize<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let tokens: BTreeSet<String> = parts
            .into_iter()
            .flat_map(|part| part.split(|c: char| !c.is_alphanumeric()))
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect();
        tokens.into_iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Rebuild the derived member index of a project and its ancestors.
    RematerializeMembership { project: Phid },
    Mail(MailMessage),
    Feed(FeedStory),
    Reindex(SearchDocument),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::RematerializeMembership { .. } => "rematerialize",
            Effect::Mail(_) => "mail",
            Effect::Feed(_) => "feed",
            Effect::Reindex(_) => "reindex",
        }
    }
}
