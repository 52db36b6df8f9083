use crate::application::profile::Recipients;
use crate::application::renderer::TransactionRenderer;
use crate::config::MailConfig;
use crate::domain::effect::MailMessage;
use crate::domain::object::EditableObject;
use crate::domain::transaction::Transaction;

/// Builds notification mail from rendered transactions.
#[derive(Debug, Clone)]
pub struct MailComposer {
    base_uri: String,
    vary_subjects: bool,
}

impl MailComposer {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            base_uri: config.base_uri.trim_end_matches('/').to_string(),
            vary_subjects: config.vary_subjects,
        }
    }

    pub fn compose<O: EditableObject>(
        &self,
        prefix: &str,
        object: &O,
        uri: &str,
        renderer: &TransactionRenderer<'_, O>,
        xactions: &[Transaction],
        recipients: Recipients,
        is_first_message: bool,
    ) -> MailMessage {
        let name = object.display_name();
        let subject = if self.vary_subjects {
            format!("{prefix} [{}] {name}", renderer.action_name(xactions))
        } else {
            format!("{prefix} {name}")
        };

        let mut body = Vec::new();
        for xaction in xactions {
            if let Some(comment) = &xaction.comment {
                body.push(comment.content().to_string());
            } else if !renderer.should_hide(xaction) {
                body.push(renderer.title(xaction));
            }
        }
        body.push(String::new());
        body.push(format!("{} DETAIL", O::KIND.to_uppercase()));
        body.push(format!("  {}/{uri}", self.base_uri));

        MailMessage {
            object_phid: object.phid().clone(),
            subject,
            thread_topic: format!("{prefix} {}", object.phid()),
            cc: recipients.cc.difference(&recipients.to).cloned().collect(),
            to: recipients.to.into_iter().collect(),
            body: body.join("\n"),
            tags: renderer.mail_tags(xactions),
            is_first_message,
        }
    }
}
