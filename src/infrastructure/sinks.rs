//! Effect adapters: logging sinks for the CLI, recording sinks for tests and
//! embedders, and an in-memory search index.

use crate::domain::effect::{FeedStory, MailMessage, SearchDocument};
use crate::domain::phid::Phid;
use crate::domain::ports::{FeedSink, MailSink, SearchIndex};
use crate::error::EffectError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Logs outgoing mail instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailSink;

#[async_trait]
impl MailSink for LogMailSink {
    async fn send(&self, message: &MailMessage) -> Result<(), EffectError> {
        info!(
            object = %message.object_phid,
            subject = %message.subject,
            to = message.to.len(),
            cc = message.cc.len(),
            "mail queued"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedSink;

#[async_trait]
impl FeedSink for LogFeedSink {
    async fn publish(&self, story: &FeedStory) -> Result<(), EffectError> {
        info!(object = %story.object_phid, "feed: {}", story.text);
        Ok(())
    }
}

/// Keeps every message it is given. Optionally fails every delivery.
#[derive(Debug, Default, Clone)]
pub struct RecordingMailSink {
    sent: Arc<Mutex<Vec<MailMessage>>>,
    fail: bool,
}

impl RecordingMailSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MailSink for RecordingMailSink {
    async fn send(&self, message: &MailMessage) -> Result<(), EffectError> {
        if self.fail {
            return Err(EffectError::Mail("mail relay unavailable".to_string()));
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingFeedSink {
    stories: Arc<Mutex<Vec<FeedStory>>>,
    fail: bool,
}

impl RecordingFeedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn stories(&self) -> Vec<FeedStory> {
        self.stories.lock().await.clone()
    }
}

#[async_trait]
impl FeedSink for RecordingFeedSink {
    async fn publish(&self, story: &FeedStory) -> Result<(), EffectError> {
        if self.fail {
            return Err(EffectError::Feed("feed storage unavailable".to_string()));
        }
        self.stories.lock().await.push(story.clone());
        Ok(())
    }
}

/// Latest document per object, searchable by token.
#[derive(Debug, Default, Clone)]
pub struct InMemorySearchIndex {
    documents: Arc<RwLock<HashMap<Phid, SearchDocument>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document(&self, phid: &Phid) -> Option<SearchDocument> {
        self.documents.read().await.get(phid).cloned()
    }

    /// Objects whose document contains `token` (case-insensitive), sorted.
    pub async fn search(&self, token: &str) -> Vec<Phid> {
        let token = token.to_lowercase();
        let documents = self.documents.read().await;
        let mut hits: Vec<Phid> = documents
            .values()
            .filter(|document| document.tokens.contains(&token))
            .map(|document| document.phid.clone())
            .collect();
        hits.sort();
        hits
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index(&self, document: &SearchDocument) -> Result<(), EffectError> {
        self.documents
            .write()
            .await
            .insert(document.phid.clone(), document.clone());
        Ok(())
    }
}
