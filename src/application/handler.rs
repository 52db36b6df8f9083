use crate::application::renderer::HandleMap;
use crate::domain::batch::WriteBatch;
use crate::domain::edge::{EdgeDelta, EdgeSpec, EdgeType};
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, Capability, CapabilityCheck, Policy};
use crate::domain::ports::StoreRead;
use crate::domain::transaction::{
    PendingTransaction, Transaction, TransactionDraft, TransactionType, ValidationError,
};
use crate::domain::value::Value;
use crate::error::{EditError, RegistryError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// A capability a transaction requires before it may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Checked against the edited object; skipped while creating it.
    Object(Capability),
    /// Checked against the application policy; always enforced.
    Application(Capability),
}

/// What a handler can see while computing values and validating.
pub struct HandlerContext<'a> {
    pub reader: &'a dyn StoreRead,
    pub actor: &'a Actor,
    pub checker: &'a dyn CapabilityCheck,
    pub is_new: bool,
    /// The whole expanded batch, in submission order.
    pub drafts: &'a [TransactionDraft],
    /// Effective transactions; empty until values have been computed.
    pub pending: &'a [PendingTransaction],
}

impl HandlerContext<'_> {
    pub fn draft(&self, r#type: &TransactionType) -> Option<&TransactionDraft> {
        self.drafts.iter().find(|draft| &draft.r#type == r#type)
    }

    pub fn pending(&self, r#type: &TransactionType) -> Option<&PendingTransaction> {
        self.pending.iter().find(|pending| &pending.r#type == r#type)
    }
}

/// Behaviour of one transaction type for one object kind.
///
/// Value and validation hooks run inside the write connection; `apply_*`
/// hooks run after validation and authorization passed.
#[async_trait]
pub trait TransactionHandler<O: EditableObject>: Send + Sync {
    fn transaction_type(&self) -> TransactionType;

    /// Current value read from the object. Not called for new objects unless
    /// [`Self::reads_store_on_create`] is set; they start from null.
    async fn old_value(&self, ctx: &HandlerContext<'_>, object: &O) -> Result<Value, EditError>;

    fn reads_store_on_create(&self) -> bool {
        false
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        _old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        Ok(submitted.clone())
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        pending.old_value != pending.new_value
    }

    /// Called once per pending transaction of this type, or once with `None`
    /// when the batch has none (so required fields are enforced on creation).
    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        _pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        Ok(Vec::new())
    }

    fn requirements(
        &self,
        _object: &O,
        _actor: &Actor,
        _pending: &PendingTransaction,
    ) -> Vec<Requirement> {
        vec![Requirement::Object(Capability::Edit)]
    }

    fn apply_internal(&self, object: &mut O, pending: &PendingTransaction) -> Result<(), EditError>;

    fn apply_external(
        &self,
        _object: &O,
        _pending: &PendingTransaction,
        _batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String;

    fn title_for_feed(&self, xaction: &Transaction, handles: &HandleMap, object_name: &str) -> String {
        format!("{} ({object_name})", self.title(xaction, handles))
    }

    /// Setting a field for the first time is noise in the timeline.
    fn should_hide(&self, xaction: &Transaction) -> bool {
        xaction.old_value.is_null()
    }

    fn mail_tag(&self) -> &'static str {
        "other"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Edited"
    }

    /// PHIDs the title refers to besides the author.
    fn required_handles(&self, _xaction: &Transaction) -> Vec<Phid> {
        Vec::new()
    }
}

/// Handlers of one object kind, keyed by transaction type. Built once.
pub struct HandlerRegistry<O: EditableObject> {
    handlers: HashMap<TransactionType, Box<dyn TransactionHandler<O>>>,
    order: Vec<TransactionType>,
}

impl<O: EditableObject> HandlerRegistry<O> {
    pub fn builder() -> HandlerRegistryBuilder<O> {
        HandlerRegistryBuilder {
            handlers: Vec::new(),
        }
    }

    pub fn get(&self, r#type: &TransactionType) -> Option<&dyn TransactionHandler<O>> {
        self.handlers.get(r#type).map(|handler| handler.as_ref())
    }

    pub fn resolve(&self, r#type: &TransactionType) -> Result<&dyn TransactionHandler<O>, EditError> {
        self.get(r#type).ok_or_else(|| {
            EditError::InvalidTransaction(format!(
                "transaction type \"{}\" is not supported by {} objects",
                r#type,
                O::KIND
            ))
        })
    }

    /// Every handler in registration order.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn TransactionHandler<O>> {
        self.order
            .iter()
            .filter_map(|r#type| self.get(r#type))
    }

    pub fn supports(&self, r#type: &TransactionType) -> bool {
        self.handlers.contains_key(r#type)
    }
}

pub struct HandlerRegistryBuilder<O: EditableObject> {
    handlers: Vec<Box<dyn TransactionHandler<O>>>,
}

impl<O: EditableObject> HandlerRegistryBuilder<O> {
    pub fn handler(mut self, handler: impl TransactionHandler<O> + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn build(self) -> Result<HandlerRegistry<O>, RegistryError> {
        let mut handlers = HashMap::new();
        let mut order = Vec::new();
        for handler in self.handlers {
            let r#type = handler.transaction_type();
            if handlers.contains_key(&r#type) {
                return Err(RegistryError::DuplicateHandler(r#type.tag()));
            }
            order.push(r#type.clone());
            handlers.insert(r#type, handler);
        }
        Ok(HandlerRegistry { handlers, order })
    }
}

fn author(xaction: &Transaction, handles: &HandleMap) -> String {
    handles.name(&xaction.author_phid)
}

/// `core.view-policy`, `core.edit-policy` and `core.join-policy`.
pub struct PolicyHandler {
    capability: Capability,
}

impl PolicyHandler {
    pub fn new(capability: Capability) -> Self {
        Self { capability }
    }

    fn policy_type(&self) -> TransactionType {
        match self.capability {
            Capability::View => TransactionType::ViewPolicy,
            Capability::Join => TransactionType::JoinPolicy,
            _ => TransactionType::EditPolicy,
        }
    }

    fn label(value: &Value) -> String {
        value
            .as_text()
            .and_then(Policy::parse)
            .map_or_else(|| value.display(), |policy| policy.label())
    }
}

#[async_trait]
impl<O: EditableObject> TransactionHandler<O> for PolicyHandler {
    fn transaction_type(&self) -> TransactionType {
        self.policy_type()
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &O) -> Result<Value, EditError> {
        Ok(object
            .policy(self.capability)
            .map_or(Value::Null, |policy| Value::text(policy.as_string())))
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &O,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let Some(pending) = pending else {
            return Ok(Vec::new());
        };
        let r#type = self.policy_type();
        let Some(policy) = pending.new_value.as_text().and_then(Policy::parse) else {
            return Ok(vec![ValidationError::invalid(
                r#type,
                format!("\"{}\" is not a valid policy.", pending.new_value.display()),
                Some(pending.new_value.clone()),
            )]);
        };
        if self.capability == Capability::Edit {
            // Evaluate against the edge sets this batch will leave behind, so
            // joining and restricting to members can happen in one edit.
            let mut preview = object.clone();
            for other in ctx.pending {
                if let TransactionType::Edge(edge_type) = &other.r#type
                    && let Some(destinations) = other.new_value.to_phid_set()
                {
                    preview.edges_changed(*edge_type, &destinations);
                }
            }
            preview.set_policy(Capability::Edit, policy);
            if !ctx.checker.has_capability(ctx.actor, &preview, Capability::Edit) {
                return Ok(vec![ValidationError::invalid(
                    r#type,
                    "You can not select this edit policy, because you would no longer be able to edit the object.",
                    Some(pending.new_value.clone()),
                )]);
            }
        }
        Ok(Vec::new())
    }

    fn apply_internal(&self, object: &mut O, pending: &PendingTransaction) -> Result<(), EditError> {
        let policy = pending
            .new_value
            .as_text()
            .and_then(Policy::parse)
            .ok_or_else(|| EditError::InvalidTransaction("policy value did not parse".into()))?;
        if !object.set_policy(self.capability, policy) {
            return Err(EditError::InvalidTransaction(format!(
                "{} objects have no {} policy",
                O::KIND,
                self.capability
            )));
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let what = match self.capability {
            Capability::View => "view",
            Capability::Join => "join",
            _ => "edit",
        };
        format!(
            "{} changed the {what} policy from \"{}\" to \"{}\".",
            author(xaction, handles),
            Self::label(&xaction.old_value),
            Self::label(&xaction.new_value)
        )
    }

    fn mail_tag(&self) -> &'static str {
        "other"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Policy"
    }
}

/// `core.comment`. Comments always have an effect and are never coalesced.
pub struct CommentHandler {
    mail_tag: &'static str,
}

impl CommentHandler {
    pub fn new(mail_tag: &'static str) -> Self {
        Self { mail_tag }
    }
}

#[async_trait]
impl<O: EditableObject> TransactionHandler<O> for CommentHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Comment
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, _object: &O) -> Result<Value, EditError> {
        Ok(Value::Null)
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        _old: &Value,
        _submitted: &Value,
    ) -> Result<Value, EditError> {
        Ok(Value::Null)
    }

    fn has_effect(&self, _pending: &PendingTransaction) -> bool {
        true
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if !pending.has_comment() => Ok(vec![ValidationError::required(
                TransactionType::Comment,
                "Comments can not be empty.",
            )]),
            _ => Ok(Vec::new()),
        }
    }

    fn requirements(&self, _: &O, _: &Actor, _: &PendingTransaction) -> Vec<Requirement> {
        vec![Requirement::Object(Capability::View)]
    }

    fn apply_internal(&self, _object: &mut O, _pending: &PendingTransaction) -> Result<(), EditError> {
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        format!("{} added a comment.", author(xaction, handles))
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        self.mail_tag
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Commented"
    }
}

/// Generic `core.edge:<type>` handler. Old values are the store's current
/// destination set; new values are that set with the submitted `=`/`+`/`-`
/// operations applied.
pub struct EdgeHandler {
    edge_type: EdgeType,
    mail_tag: &'static str,
    noun: &'static str,
}

impl EdgeHandler {
    pub fn new(edge_type: EdgeType, noun: &'static str, mail_tag: &'static str) -> Self {
        Self {
            edge_type,
            mail_tag,
            noun,
        }
    }

    pub fn edge_type(&self) -> EdgeType {
        self.edge_type
    }

    pub fn delta(pending: &PendingTransaction) -> EdgeDelta {
        let old = pending.old_value.to_phid_set().unwrap_or_default();
        let new = pending.new_value.to_phid_set().unwrap_or_default();
        EdgeDelta::between(&old, &new)
    }

    /// Self-service add/remove needs `self_capability`; anything else `Edit`.
    pub fn self_service_requirements(
        actor: &Actor,
        pending: &PendingTransaction,
        self_capability: Capability,
    ) -> Vec<Requirement> {
        let delta = Self::delta(pending);
        if delta.is_only_adding(actor.phid()) || delta.is_only_removing(actor.phid()) {
            vec![Requirement::Object(self_capability)]
        } else {
            vec![Requirement::Object(Capability::Edit)]
        }
    }

    pub async fn current(
        &self,
        ctx: &HandlerContext<'_>,
        src: &Phid,
    ) -> Result<BTreeSet<Phid>, EditError> {
        if ctx.is_new {
            return Ok(BTreeSet::new());
        }
        Ok(ctx.reader.edge_destinations(src, self.edge_type).await?)
    }

    pub fn render(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let delta = Self::delta(&PendingTransaction {
            r#type: xaction.r#type.clone(),
            old_value: xaction.old_value.clone(),
            new_value: xaction.new_value.clone(),
            comment: None,
        });
        let who = author(xaction, handles);
        let names = |set: &BTreeSet<Phid>| {
            set.iter()
                .map(|phid| handles.name(phid))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match (delta.added.is_empty(), delta.removed.is_empty()) {
            (false, true) => format!("{who} added {}: {}.", self.noun, names(&delta.added)),
            (true, false) => format!("{who} removed {}: {}.", self.noun, names(&delta.removed)),
            _ => format!(
                "{who} changed {}, added: {}; removed: {}.",
                self.noun,
                names(&delta.added),
                names(&delta.removed)
            ),
        }
    }
}

#[async_trait]
impl<O: EditableObject> TransactionHandler<O> for EdgeHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Edge(self.edge_type)
    }

    async fn old_value(&self, ctx: &HandlerContext<'_>, object: &O) -> Result<Value, EditError> {
        Ok(Value::phids(&self.current(ctx, object.phid()).await?))
    }

    fn reads_store_on_create(&self) -> bool {
        true
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        // Unparseable specs are passed through and rejected by `validate`.
        let (Ok(spec), Some(current)) = (EdgeSpec::from_value(submitted), old.to_phid_set()) else {
            return Ok(submitted.clone());
        };
        Ok(Value::phids(&spec.apply(&current)))
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        match (pending.old_value.to_phid_set(), pending.new_value.to_phid_set()) {
            (Some(old), Some(new)) => old != new,
            _ => true,
        }
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &O,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if pending.new_value.to_phid_set().is_none() => {
                Ok(vec![ValidationError::invalid(
                    TransactionType::Edge(self.edge_type),
                    format!(
                        "Edge value is not a list of valid PHIDs: {}",
                        pending.new_value.display()
                    ),
                    Some(pending.new_value.clone()),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut O, pending: &PendingTransaction) -> Result<(), EditError> {
        let destinations = pending.new_value.to_phid_set().unwrap_or_default();
        object.edges_changed(self.edge_type, &destinations);
        Ok(())
    }

    fn apply_external(
        &self,
        object: &O,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        batch.apply_delta(object.phid(), self.edge_type, &Self::delta(pending));
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        self.render(xaction, handles)
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        self.mail_tag
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Edited"
    }

    fn required_handles(&self, xaction: &Transaction) -> Vec<Phid> {
        let old = xaction.old_value.to_phid_set().unwrap_or_default();
        let new = xaction.new_value.to_phid_set().unwrap_or_default();
        old.symmetric_difference(&new).cloned().collect()
    }
}

/// Subscription edges: users may subscribe or unsubscribe themselves with
/// `View`.
pub struct SubscribersHandler {
    inner: EdgeHandler,
}

impl SubscribersHandler {
    pub fn new(mail_tag: &'static str) -> Self {
        Self {
            inner: EdgeHandler::new(EdgeType::ObjectSubscriber, "subscribers", mail_tag),
        }
    }
}

#[async_trait]
impl<O: EditableObject> TransactionHandler<O> for SubscribersHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Edge(EdgeType::ObjectSubscriber)
    }

    async fn old_value(&self, ctx: &HandlerContext<'_>, object: &O) -> Result<Value, EditError> {
        TransactionHandler::<O>::old_value(&self.inner, ctx, object).await
    }

    fn reads_store_on_create(&self) -> bool {
        true
    }

    async fn new_value(
        &self,
        ctx: &HandlerContext<'_>,
        object: &O,
        old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        TransactionHandler::<O>::new_value(&self.inner, ctx, object, old, submitted).await
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        TransactionHandler::<O>::has_effect(&self.inner, pending)
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &O,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        TransactionHandler::<O>::validate(&self.inner, ctx, object, pending).await
    }

    fn requirements(&self, _object: &O, actor: &Actor, pending: &PendingTransaction) -> Vec<Requirement> {
        EdgeHandler::self_service_requirements(actor, pending, Capability::View)
    }

    fn apply_internal(&self, object: &mut O, pending: &PendingTransaction) -> Result<(), EditError> {
        TransactionHandler::<O>::apply_internal(&self.inner, object, pending)
    }

    fn apply_external(
        &self,
        object: &O,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        TransactionHandler::<O>::apply_external(&self.inner, object, pending, batch)
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        self.inner.render(xaction, handles)
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        TransactionHandler::<O>::mail_tag(&self.inner)
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Subscribers"
    }

    fn required_handles(&self, xaction: &Transaction) -> Vec<Phid> {
        TransactionHandler::<O>::required_handles(&self.inner, xaction)
    }
}
