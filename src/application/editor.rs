use crate::application::handler::{HandlerContext, HandlerRegistry, Requirement};
use crate::application::mail::MailComposer;
use crate::application::profile::EditorProfile;
use crate::application::renderer::{HandleMap, TransactionRenderer};
use crate::config::{Config, MailConfig};
use crate::domain::batch::WriteBatch;
use crate::domain::edge::EdgeSpec;
use crate::domain::effect::{Effect, FeedStory};
use crate::domain::object::{EditableObject, ObjectRecord};
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, Capability};
use crate::domain::ports::{Authorizer, StoreHandle, StoreRead};
use crate::domain::transaction::{
    ContentSource, PendingTransaction, Transaction, TransactionDraft, TransactionStamp,
    TransactionType, ValidationError,
};
use crate::domain::value::Value;
use crate::error::{EditError, Result};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Result of a successful `apply_transactions` call.
#[derive(Debug, Clone)]
pub struct EditOutcome<O> {
    pub object: O,
    /// Persisted transactions, in commit order. Empty when nothing changed.
    pub transactions: Vec<Transaction>,
    /// Post-commit work for an [`EffectDispatcher`](crate::application::dispatcher::EffectDispatcher).
    pub effects: Vec<Effect>,
    /// Problems hit while deriving effects. The edit itself is committed.
    pub warnings: Vec<String>,
}

impl<O> EditOutcome<O> {
    fn unchanged(object: O) -> Self {
        Self {
            object,
            transactions: Vec::new(),
            effects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Applies batches of transactions to objects of one kind.
///
/// Each call runs expand, compute, filter, validate, authorize, apply and
/// persist while holding the store's write connection, then derives effects
/// from what was committed.
#[derive(Clone)]
pub struct TransactionEditor<O: EditableObject> {
    store: StoreHandle,
    authorizer: Arc<dyn Authorizer>,
    profile: Arc<dyn EditorProfile<O>>,
    actor: Actor,
    content_source: ContentSource,
    continue_on_no_effect: bool,
    mail: MailComposer,
}

impl<O: EditableObject> TransactionEditor<O> {
    pub fn new(
        store: StoreHandle,
        authorizer: Arc<dyn Authorizer>,
        profile: Arc<dyn EditorProfile<O>>,
        actor: Actor,
        content_source: ContentSource,
    ) -> Self {
        Self {
            store,
            authorizer,
            profile,
            actor,
            content_source,
            continue_on_no_effect: true,
            mail: MailComposer::new(&MailConfig::default()),
        }
    }

    pub fn with_config(mut self, config: &Config) -> Self {
        self.continue_on_no_effect = config.editor.continue_on_no_effect;
        self.mail = MailComposer::new(&config.mail);
        self
    }

    pub fn continue_on_no_effect(mut self, continue_on_no_effect: bool) -> Self {
        self.continue_on_no_effect = continue_on_no_effect;
        self
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn initialize(&self) -> O {
        self.profile.initialize(&self.actor)
    }

    pub async fn load(&self, phid: &Phid) -> Result<Option<O>> {
        self.profile.load(self.store.as_ref(), phid).await
    }

    pub async fn apply_transactions(
        &self,
        mut object: O,
        drafts: Vec<TransactionDraft>,
    ) -> Result<EditOutcome<O>> {
        let registry = self.profile.registry();
        let (drafts, early_errors) = expand(registry, drafts)?;

        let txn = self.store.begin_write().await?;
        let reader: &dyn StoreRead = &*txn;
        let is_new = reader.object(object.phid()).await?.is_none();

        let computed = self.compute(reader, &object, &drafts, is_new).await?;
        let (pending, no_effect) = filter_no_effect(registry, computed)?;
        if !no_effect.is_empty() {
            if !self.continue_on_no_effect {
                return Err(EditError::NoEffect(no_effect));
            }
            debug!(
                object = %object.phid(),
                dropped = no_effect.len(),
                "dropping transactions with no effect"
            );
        }
        if pending.is_empty() && early_errors.is_empty() {
            debug!(object = %object.phid(), "nothing to apply");
            return Ok(EditOutcome::unchanged(object));
        }

        let ctx = HandlerContext {
            reader,
            actor: &self.actor,
            checker: self.authorizer.as_ref(),
            is_new,
            drafts: &drafts,
            pending: &pending,
        };
        let errors = validate(registry, &ctx, &object, early_errors).await?;
        if !errors.is_empty() {
            debug!(object = %object.phid(), errors = errors.len(), "edit rejected");
            return Err(EditError::Validation(errors));
        }
        self.authorize(registry, &object, &pending, is_new)?;

        for pending in &pending {
            registry
                .resolve(&pending.r#type)?
                .apply_internal(&mut object, pending)?;
        }
        let mut batch = WriteBatch::new();
        for pending in &pending {
            registry
                .resolve(&pending.r#type)?
                .apply_external(&object, pending, &mut batch)?;
        }
        self.profile.prepare_persist(reader, &mut object).await?;
        batch.put_object(ObjectRecord::from_object(&object)?);

        let first_sequence = reader
            .transactions(object.phid())
            .await?
            .last()
            .map_or(1, |last| last.sequence + 1);
        let created_at = now();
        let xactions: Vec<Transaction> = pending
            .into_iter()
            .zip(first_sequence..)
            .map(|(pending, sequence)| {
                Transaction::from_pending(
                    pending,
                    TransactionStamp {
                        phid: Phid::generate_transaction(O::PHID_TYPE),
                        object_phid: object.phid().clone(),
                        author_phid: self.actor.phid().clone(),
                        content_source: self.content_source,
                        sequence,
                        created_at,
                    },
                )
            })
            .collect();
        for xaction in &xactions {
            batch.push_transaction(xaction.clone());
        }

        txn.commit(batch).await?;
        info!(
            object = %object.phid(),
            kind = O::KIND,
            transactions = xactions.len(),
            created = is_new,
            "committed edit"
        );

        let (effects, warnings) = self.build_effects(&object, &xactions, is_new).await;
        Ok(EditOutcome {
            object,
            transactions: xactions,
            effects,
            warnings,
        })
    }

    async fn compute(
        &self,
        reader: &dyn StoreRead,
        object: &O,
        drafts: &[TransactionDraft],
        is_new: bool,
    ) -> Result<Vec<PendingTransaction>> {
        let registry = self.profile.registry();
        let ctx = HandlerContext {
            reader,
            actor: &self.actor,
            checker: self.authorizer.as_ref(),
            is_new,
            drafts,
            pending: &[],
        };
        let mut pending = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let handler = registry.resolve(&draft.r#type)?;
            let old_value = if is_new && !handler.reads_store_on_create() {
                Value::Null
            } else {
                handler.old_value(&ctx, object).await?
            };
            let new_value = handler
                .new_value(&ctx, object, &old_value, &draft.value)
                .await?;
            pending.push(PendingTransaction {
                r#type: draft.r#type.clone(),
                old_value,
                new_value,
                comment: draft.comment.clone(),
            });
        }
        Ok(pending)
    }

    fn authorize(
        &self,
        registry: &HandlerRegistry<O>,
        object: &O,
        pending: &[PendingTransaction],
        is_new: bool,
    ) -> Result<()> {
        for pending in pending {
            let handler = registry.resolve(&pending.r#type)?;
            for requirement in handler.requirements(object, &self.actor, pending) {
                let checked = match requirement {
                    Requirement::Object(_) if is_new => Ok(()),
                    Requirement::Object(capability) => {
                        self.authorizer
                            .require_capability(&self.actor, object, capability)
                    }
                    Requirement::Application(capability) => self.authorizer.require_capability(
                        &self.actor,
                        self.profile.application_policy(),
                        capability,
                    ),
                };
                if let Err(err) = checked {
                    warn!(transaction = %pending.r#type, "{err}");
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    async fn build_effects(
        &self,
        object: &O,
        xactions: &[Transaction],
        is_new: bool,
    ) -> (Vec<Effect>, Vec<String>) {
        let registry = self.profile.registry();
        let reader: &dyn StoreRead = self.store.as_ref();
        let mut effects = self.profile.extra_effects(object, xactions);
        let mut warnings = Vec::new();

        let wants_mail = self.profile.should_send_mail(object, xactions);
        let wants_feed = self.profile.should_publish_feed(object, xactions);
        if wants_mail || wants_feed {
            let phids = TransactionRenderer::required_handles(registry, xactions);
            match HandleMap::load(reader, phids).await {
                Ok(handles) => {
                    let renderer = TransactionRenderer::new(registry, &handles);
                    if wants_mail {
                        match self
                            .profile
                            .mail_recipients(reader, object, &self.actor)
                            .await
                        {
                            Ok(recipients) => effects.push(Effect::Mail(self.mail.compose(
                                self.profile.mail_prefix(),
                                object,
                                &self.profile.object_uri(object),
                                &renderer,
                                xactions,
                                recipients,
                                is_new,
                            ))),
                            Err(err) => warnings.push(format!("mail not sent: {err}")),
                        }
                    }
                    if wants_feed {
                        effects.push(Effect::Feed(feed_story(object, &renderer, xactions, &self.actor)));
                    }
                }
                Err(err) => warnings.push(format!("could not load handles: {err}")),
            }
        }
        effects.push(Effect::Reindex(object.search_document()));

        for warning in &warnings {
            warn!(object = %object.phid(), "{warning}");
        }
        (effects, warnings)
    }

    /// Flips the display-only `hidden` flag of a persisted transaction.
    pub async fn hide_transaction(&self, object: &O, xaction: &Phid, hidden: bool) -> Result<()> {
        self.authorizer
            .require_capability(&self.actor, object, Capability::Edit)?;
        let txn = self.store.begin_write().await?;
        let known = txn
            .transactions(object.phid())
            .await?
            .iter()
            .any(|existing| &existing.phid == xaction);
        if !known {
            return Err(EditError::InvalidTransaction(format!(
                "{xaction} is not a transaction of {}",
                object.phid()
            )));
        }
        let mut batch = WriteBatch::new();
        batch.set_hidden(object.phid(), xaction, hidden);
        txn.commit(batch).await?;
        info!(object = %object.phid(), transaction = %xaction, hidden, "updated transaction visibility");
        Ok(())
    }
}

/// Checks types and coalesces repeated ones: the last value wins, edge
/// operations compose in order, comments are kept separate.
fn expand<O: EditableObject>(
    registry: &HandlerRegistry<O>,
    drafts: Vec<TransactionDraft>,
) -> Result<(Vec<TransactionDraft>, Vec<ValidationError>)> {
    let mut expanded: Vec<TransactionDraft> = Vec::with_capacity(drafts.len());
    let mut errors = Vec::new();
    let mut split_comments = Vec::new();

    for mut draft in drafts {
        registry.resolve(&draft.r#type)?;
        if draft.r#type == TransactionType::Comment {
            expanded.push(draft);
            continue;
        }
        let spec = match &draft.r#type {
            TransactionType::Edge(_) => match EdgeSpec::from_value(&draft.value) {
                Ok(spec) => Some(spec),
                Err(message) => {
                    errors.push(ValidationError::invalid(
                        draft.r#type.clone(),
                        message,
                        Some(draft.value.clone()),
                    ));
                    continue;
                }
            },
            _ => None,
        };
        let Some(earlier) = expanded.iter_mut().find(|e| e.r#type == draft.r#type) else {
            expanded.push(draft);
            continue;
        };
        earlier.value = match spec {
            Some(spec) => EdgeSpec::from_value(&earlier.value)
                .map_err(EditError::InvalidTransaction)?
                .then(spec)
                .to_value(),
            None => std::mem::take(&mut draft.value),
        };
        match (earlier.comment.take(), draft.comment.take()) {
            (Some(first), Some(second)) => {
                split_comments.push(TransactionDraft {
                    r#type: TransactionType::Comment,
                    value: Value::Null,
                    comment: Some(first),
                });
                earlier.comment = Some(second);
            }
            (first, second) => earlier.comment = second.or(first),
        }
    }
    expanded.extend(split_comments);
    Ok((expanded, errors))
}

/// Splits effective transactions from no-op ones. A no-op carrying a comment
/// survives as a plain comment.
fn filter_no_effect<O: EditableObject>(
    registry: &HandlerRegistry<O>,
    computed: Vec<PendingTransaction>,
) -> Result<(Vec<PendingTransaction>, Vec<PendingTransaction>)> {
    let mut kept = Vec::with_capacity(computed.len());
    let mut dropped = Vec::new();
    for pending in computed {
        if registry.resolve(&pending.r#type)?.has_effect(&pending) {
            kept.push(pending);
        } else if pending.has_comment() && registry.supports(&TransactionType::Comment) {
            kept.push(PendingTransaction {
                r#type: TransactionType::Comment,
                old_value: Value::Null,
                new_value: Value::Null,
                comment: pending.comment,
            });
        } else {
            dropped.push(pending);
        }
    }
    Ok((kept, dropped))
}

/// Runs every registered handler's validation, including handlers with no
/// transaction in the batch.
async fn validate<O: EditableObject>(
    registry: &HandlerRegistry<O>,
    ctx: &HandlerContext<'_>,
    object: &O,
    mut errors: Vec<ValidationError>,
) -> Result<Vec<ValidationError>> {
    for handler in registry.handlers() {
        let r#type = handler.transaction_type();
        let matching: Vec<&PendingTransaction> = ctx
            .pending
            .iter()
            .filter(|pending| pending.r#type == r#type)
            .collect();
        if matching.is_empty() {
            errors.extend(handler.validate(ctx, object, None).await?);
        }
        for pending in matching {
            errors.extend(handler.validate(ctx, object, Some(pending)).await?);
        }
    }
    Ok(errors)
}

fn feed_story<O: EditableObject>(
    object: &O,
    renderer: &TransactionRenderer<'_, O>,
    xactions: &[Transaction],
    actor: &Actor,
) -> FeedStory {
    let text = xactions
        .iter()
        .filter(|xaction| !renderer.should_hide(xaction))
        .map(|xaction| renderer.title_for_feed(xaction))
        .collect::<Vec<_>>()
        .join(" ");
    FeedStory {
        object_phid: object.phid().clone(),
        author_phid: actor.phid().clone(),
        transaction_phids: xactions.iter().map(|xaction| xaction.phid.clone()).collect(),
        text,
        created_at: xactions.first().map_or_else(now, |xaction| xaction.created_at),
    }
}

/// Replays persisted history onto `initial`. For any object, folding its
/// full history onto a fresh object reproduces its stored field values.
pub fn fold_transactions<O: EditableObject>(
    profile: &dyn EditorProfile<O>,
    initial: O,
    history: &[Transaction],
) -> Result<O> {
    let registry = profile.registry();
    let mut ordered: Vec<&Transaction> = history.iter().collect();
    ordered.sort_by_key(|xaction| xaction.sequence);

    let mut object = initial;
    for xaction in ordered {
        let pending = PendingTransaction {
            r#type: xaction.r#type.clone(),
            old_value: xaction.old_value.clone(),
            new_value: xaction.new_value.clone(),
            comment: None,
        };
        registry
            .resolve(&xaction.r#type)?
            .apply_internal(&mut object, &pending)?;
    }
    Ok(object)
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
