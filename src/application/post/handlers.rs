use crate::application::handler::{HandlerContext, TransactionHandler};
use crate::application::renderer::HandleMap;
use crate::domain::post::{Post, PostVisibility};
use crate::domain::transaction::{PendingTransaction, Transaction, TransactionType, ValidationError};
use crate::domain::value::Value;
use crate::error::EditError;
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

pub const TITLE: &str = "post.title";
pub const BODY: &str = "post.body";
pub const VISIBILITY: &str = "post.visibility";

fn custom(tag: &str) -> TransactionType {
    TransactionType::Custom(tag.to_string())
}

fn author(xaction: &Transaction, handles: &HandleMap) -> String {
    handles.name(&xaction.author_phid)
}

pub struct TitleHandler;

#[async_trait]
impl TransactionHandler<Post> for TitleHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(TITLE)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Post) -> Result<Value, EditError> {
        Ok(Value::text(&object.title))
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        _object: &Post,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let missing = match pending {
            Some(pending) => pending.new_value.is_blank(),
            None => ctx.is_new,
        };
        if missing {
            return Ok(vec![ValidationError::required(custom(TITLE), "Posts must have a title.")]);
        }
        Ok(Vec::new())
    }

    fn apply_internal(&self, object: &mut Post, pending: &PendingTransaction) -> Result<(), EditError> {
        object.title = pending.new_value.as_text().unwrap_or_default().trim().to_string();
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        if xaction.old_value.is_blank() {
            format!("{} created this post.", author(xaction, handles))
        } else {
            format!(
                "{} retitled this post from \"{}\" to \"{}\".",
                author(xaction, handles),
                xaction.old_value.display(),
                xaction.new_value.display()
            )
        }
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        "content"
    }

    fn action_name(&self, xaction: &Transaction) -> &'static str {
        if xaction.old_value.is_blank() { "Created" } else { "Retitled" }
    }
}

pub struct BodyHandler;

#[async_trait]
impl TransactionHandler<Post> for BodyHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(BODY)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Post) -> Result<Value, EditError> {
        Ok(Value::text(&object.body))
    }

    fn apply_internal(&self, object: &mut Post, pending: &PendingTransaction) -> Result<(), EditError> {
        object.body = pending.new_value.as_text().unwrap_or_default().to_string();
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        format!("{} updated the post's content.", author(xaction, handles))
    }

    fn mail_tag(&self) -> &'static str {
        "content"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Updated"
    }
}

/// Draft or published. Publishing stamps `date_published` once.
pub struct VisibilityHandler;

#[async_trait]
impl TransactionHandler<Post> for VisibilityHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(VISIBILITY)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Post) -> Result<Value, EditError> {
        Ok(Value::text(object.visibility.as_str()))
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Post,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if pending.new_value.as_text().and_then(PostVisibility::parse).is_none() => {
                Ok(vec![ValidationError::invalid(
                    custom(VISIBILITY),
                    "Visibility must be \"draft\" or \"published\".",
                    Some(pending.new_value.clone()),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut Post, pending: &PendingTransaction) -> Result<(), EditError> {
        object.visibility = pending
            .new_value
            .as_text()
            .and_then(PostVisibility::parse)
            .unwrap_or_default();
        match object.visibility {
            PostVisibility::Published if object.date_published.is_none() => {
                object.date_published = Some(
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|elapsed| elapsed.as_secs())
                        .unwrap_or_default(),
                );
            }
            PostVisibility::Draft => object.date_published = None,
            PostVisibility::Published => {}
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        match xaction.new_value.as_text() {
            Some("published") => format!("{} published this post.", author(xaction, handles)),
            _ => format!("{} unpublished this post.", author(xaction, handles)),
        }
    }

    fn should_hide(&self, xaction: &Transaction) -> bool {
        xaction.old_value.is_null() && xaction.new_value.as_text() == Some("draft")
    }

    fn mail_tag(&self) -> &'static str {
        "content"
    }

    fn action_name(&self, xaction: &Transaction) -> &'static str {
        match xaction.new_value.as_text() {
            Some("published") => "Published",
            _ => "Unpublished",
        }
    }
}
