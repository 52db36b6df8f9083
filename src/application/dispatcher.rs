use crate::domain::effect::Effect;
use crate::domain::ports::{FeedSink, MailSink, MembershipIndex, SearchIndex};
use crate::error::EffectError;
use std::sync::Arc;
use tracing::{debug, error};

/// What happened to each dispatched effect.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<&'static str>,
    pub failures: Vec<(&'static str, EffectError)>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs post-commit effects. Failures are logged and collected; they never
/// undo the edit that produced them.
#[derive(Clone)]
pub struct EffectDispatcher {
    mail: Arc<dyn MailSink>,
    feed: Arc<dyn FeedSink>,
    search: Arc<dyn SearchIndex>,
    membership: Arc<dyn MembershipIndex>,
}

impl EffectDispatcher {
    pub fn new(
        mail: Arc<dyn MailSink>,
        feed: Arc<dyn FeedSink>,
        search: Arc<dyn SearchIndex>,
        membership: Arc<dyn MembershipIndex>,
    ) -> Self {
        Self {
            mail,
            feed,
            search,
            membership,
        }
    }

    pub async fn dispatch(&self, effects: &[Effect]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for effect in effects {
            let result = match effect {
                Effect::RematerializeMembership { project } => {
                    self.membership.rematerialize(project).await
                }
                Effect::Mail(message) => self.mail.send(message).await,
                Effect::Feed(story) => self.feed.publish(story).await,
                Effect::Reindex(document) => self.search.index(document).await,
            };
            match result {
                Ok(()) => {
                    debug!(effect = effect.name(), "effect dispatched");
                    report.delivered.push(effect.name());
                }
                Err(err) => {
                    error!(effect = effect.name(), "effect failed: {err}");
                    report.failures.push((effect.name(), err));
                }
            }
        }
        report
    }
}
