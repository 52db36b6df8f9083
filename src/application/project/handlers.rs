//! Transaction types specific to projects.

use crate::application::handler::{
    EdgeHandler, HandlerContext, Requirement, TransactionHandler,
};
use crate::application::renderer::HandleMap;
use crate::domain::attachment::Attachment;
use crate::domain::batch::{KeyConflict, WriteBatch};
use crate::domain::edge::{EdgeDelta, EdgeType};
use crate::domain::object::{EditableObject, UniqueKey};
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, Capability};
use crate::domain::project::{
    COLORS, INDEX_MILESTONE, INDEX_NAME, INDEX_SLUG, Project, ProjectStatus,
};
use crate::domain::slug::{is_valid_project_slug, normalize_project_slug, normalize_slugs};
use crate::domain::transaction::{PendingTransaction, Transaction, TransactionType, ValidationError};
use crate::domain::value::Value;
use crate::error::EditError;
use async_trait::async_trait;
use std::collections::BTreeSet;

pub const NAME: &str = "project.name";
pub const SLUGS: &str = "project.slugs";
pub const STATUS: &str = "project.status";
pub const ICON: &str = "project.icon";
pub const COLOR: &str = "project.color";
pub const IMAGE: &str = "project.image";
pub const LOCKED: &str = "project.locked";
pub const PARENT: &str = "project.parent";
pub const MILESTONE: &str = "project.milestone";

fn custom(tag: &str) -> TransactionType {
    TransactionType::Custom(tag.to_string())
}

fn author(xaction: &Transaction, handles: &HandleMap) -> String {
    handles.name(&xaction.author_phid)
}

fn text_of(value: &Value) -> String {
    value.as_text().unwrap_or_default().to_string()
}

fn phid_of(value: &Value) -> Option<Phid> {
    value.as_text().and_then(|text| Phid::parse(text).ok())
}

fn wants_milestone(ctx: &HandlerContext<'_>, object: &Project) -> bool {
    object.is_milestone() || ctx.pending(&custom(MILESTONE)).is_some()
}

async fn stored_project(ctx: &HandlerContext<'_>, phid: &Phid) -> Result<Option<Project>, EditError> {
    match ctx.reader.object(phid).await? {
        Some(record) if record.kind == Project::KIND => Ok(Some(record.decode::<Project>()?)),
        _ => Ok(None),
    }
}

pub struct NameHandler;

#[async_trait]
impl TransactionHandler<Project> for NameHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(NAME)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::text(&object.name))
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        _old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        Ok(match submitted.as_text() {
            Some(name) => Value::text(name.trim()),
            None => submitted.clone(),
        })
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let r#type = custom(NAME);
        let Some(pending) = pending else {
            if ctx.is_new && !wants_milestone(ctx, object) {
                return Ok(vec![ValidationError::required(r#type, "Projects must have a name.")]);
            }
            return Ok(Vec::new());
        };
        let value = Some(pending.new_value.clone());
        let Some(name) = pending.new_value.as_text() else {
            return Ok(vec![ValidationError::invalid(r#type, "Project names must be text.", value)]);
        };
        if name.is_empty() {
            if wants_milestone(ctx, object) {
                return Ok(Vec::new());
            }
            return Ok(vec![ValidationError::required(r#type, "Projects must have a name.")]);
        }
        if !name.chars().any(char::is_alphanumeric) {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "Project names must contain at least one letter or number.",
                value,
            )]);
        }

        let mut errors = Vec::new();
        if let Some(owner) = ctx.reader.key_owner(INDEX_NAME, &name.to_lowercase()).await?
            && &owner != object.phid()
        {
            errors.push(ValidationError::duplicate(
                r#type.clone(),
                format!("Project name \"{name}\" is already used by another project."),
                value.clone(),
            ));
        }
        let slug = normalize_project_slug(name);
        if let Some(owner) = ctx.reader.key_owner(INDEX_SLUG, &slug).await?
            && &owner != object.phid()
        {
            errors.push(ValidationError::duplicate(
                r#type,
                format!("Project name generates the same hashtag (\"#{slug}\") as another project."),
                value,
            ));
        }
        Ok(errors)
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.name = text_of(&pending.new_value);
        let slug = normalize_project_slug(&object.name);
        if let Attachment::Loaded(slugs) = &mut object.slugs
            && !slug.is_empty()
            && !slugs.contains(&slug)
        {
            slugs.push(slug);
        }
        Ok(())
    }

    fn apply_external(
        &self,
        object: &Project,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        // Old and new names both stay usable as hashtags when nobody else
        // holds them.
        for name in [&pending.old_value, &pending.new_value] {
            let slug = normalize_project_slug(&text_of(name));
            if !slug.is_empty() {
                batch.claim_key(UniqueKey::new(INDEX_SLUG, slug), object.phid(), KeyConflict::Skip);
            }
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        if xaction.old_value.is_blank() {
            format!("{} created this project.", author(xaction, handles))
        } else {
            format!(
                "{} renamed this project from \"{}\" to \"{}\".",
                author(xaction, handles),
                text_of(&xaction.old_value),
                text_of(&xaction.new_value)
            )
        }
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, xaction: &Transaction) -> &'static str {
        if xaction.old_value.is_blank() { "Created" } else { "Renamed" }
    }
}

/// Secondary hashtags. The value is the full list of hashtags other than the
/// primary one.
pub struct SlugsHandler;

impl SlugsHandler {
    fn as_set(value: &Value) -> BTreeSet<String> {
        value.as_list().unwrap_or_default().iter().cloned().collect()
    }
}

#[async_trait]
impl TransactionHandler<Project> for SlugsHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(SLUGS)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::List(object.secondary_slugs()?))
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        object: &Project,
        _old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        let Some(list) = submitted.as_list() else {
            return Ok(submitted.clone());
        };
        let slugs = normalize_slugs(list.iter().map(String::as_str))
            .into_iter()
            .filter(|slug| Some(slug) != object.primary_slug.as_ref())
            .collect();
        Ok(Value::List(slugs))
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        pending.new_value.as_list().is_none()
            || Self::as_set(&pending.old_value) != Self::as_set(&pending.new_value)
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let Some(pending) = pending else {
            return Ok(Vec::new());
        };
        let r#type = custom(SLUGS);
        let Some(slugs) = pending.new_value.as_list() else {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "Hashtags must be a list.",
                Some(pending.new_value.clone()),
            )]);
        };
        let mut errors = Vec::new();
        for slug in slugs {
            if !is_valid_project_slug(slug) {
                errors.push(ValidationError::invalid(
                    r#type.clone(),
                    "Hashtags must contain at least one letter or number.",
                    Some(Value::text(slug)),
                ));
                continue;
            }
            if let Some(owner) = ctx.reader.key_owner(INDEX_SLUG, slug).await?
                && &owner != object.phid()
            {
                errors.push(ValidationError::duplicate(
                    r#type.clone(),
                    format!("Hashtag \"#{slug}\" is already in use by another project."),
                    Some(Value::text(slug)),
                ));
            }
        }
        Ok(errors)
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        // Only the secondary delta changes here. Slugs held for the current or
        // previous name stay, whatever order the batch applies in.
        let old = Self::as_set(&pending.old_value);
        let new = Self::as_set(&pending.new_value);
        let mut slugs = object.slugs.get().cloned().unwrap_or_default();
        slugs.retain(|slug| new.contains(slug) || !old.contains(slug));
        for slug in new.difference(&old) {
            if !slugs.contains(slug) {
                slugs.push(slug.clone());
            }
        }
        object.slugs = Attachment::Loaded(slugs);
        Ok(())
    }

    fn apply_external(
        &self,
        object: &Project,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        let old = Self::as_set(&pending.old_value);
        let new = Self::as_set(&pending.new_value);
        for slug in new.difference(&old) {
            batch.claim_key(UniqueKey::new(INDEX_SLUG, slug.clone()), object.phid(), KeyConflict::Fail);
        }
        for slug in old.difference(&new) {
            batch.release_key(UniqueKey::new(INDEX_SLUG, slug.clone()), object.phid());
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let old = Self::as_set(&xaction.old_value);
        let new = Self::as_set(&xaction.new_value);
        let tags = |set: BTreeSet<&String>| {
            set.into_iter()
                .map(|slug| format!("#{slug}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let added: BTreeSet<&String> = new.difference(&old).collect();
        let removed: BTreeSet<&String> = old.difference(&new).collect();
        let who = author(xaction, handles);
        match (added.is_empty(), removed.is_empty()) {
            (false, true) => format!("{who} added hashtags: {}.", tags(added)),
            (true, false) => format!("{who} removed hashtags: {}.", tags(removed)),
            _ => format!(
                "{who} changed project hashtags, added: {}; removed: {}.",
                tags(added),
                tags(removed)
            ),
        }
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Hashtags"
    }
}

pub struct StatusHandler;

#[async_trait]
impl TransactionHandler<Project> for StatusHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(STATUS)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::text(object.status.as_str()))
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if pending.new_value.as_text().and_then(ProjectStatus::parse).is_none() => {
                Ok(vec![ValidationError::invalid(
                    custom(STATUS),
                    "Status must be \"active\" or \"archived\".",
                    Some(pending.new_value.clone()),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.status = pending
            .new_value
            .as_text()
            .and_then(ProjectStatus::parse)
            .unwrap_or_default();
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        match xaction.new_value.as_text() {
            Some("archived") => format!("{} archived this project.", author(xaction, handles)),
            _ => format!("{} activated this project.", author(xaction, handles)),
        }
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, xaction: &Transaction) -> &'static str {
        match xaction.new_value.as_text() {
            Some("archived") => "Archived",
            _ => "Activated",
        }
    }
}

pub struct IconHandler;

#[async_trait]
impl TransactionHandler<Project> for IconHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(ICON)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::text(&object.icon))
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if pending.new_value.is_blank() || pending.new_value.as_text().is_none() => {
                Ok(vec![ValidationError::required(custom(ICON), "Projects must have an icon.")])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.icon = text_of(&pending.new_value);
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        format!(
            "{} set this project's icon to {}.",
            author(xaction, handles),
            text_of(&xaction.new_value)
        )
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Icon"
    }
}

pub struct ColorHandler;

#[async_trait]
impl TransactionHandler<Project> for ColorHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(COLOR)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::text(&object.color))
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending)
                if !pending
                    .new_value
                    .as_text()
                    .is_some_and(|color| COLORS.contains(&color)) =>
            {
                Ok(vec![ValidationError::invalid(
                    custom(COLOR),
                    format!("Color must be one of: {}.", COLORS.join(", ")),
                    Some(pending.new_value.clone()),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.color = text_of(&pending.new_value);
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        format!(
            "{} set this project's color to {}.",
            author(xaction, handles),
            text_of(&xaction.new_value)
        )
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Color"
    }
}

pub struct ImageHandler;

#[async_trait]
impl TransactionHandler<Project> for ImageHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(IMAGE)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(object.image_phid.as_ref().map(ToString::to_string).into())
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if !pending.new_value.is_null() && phid_of(&pending.new_value).is_none() => {
                Ok(vec![ValidationError::invalid(
                    custom(IMAGE),
                    "Profile image must be a file PHID.",
                    Some(pending.new_value.clone()),
                )])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.image_phid = phid_of(&pending.new_value);
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        if xaction.new_value.is_null() {
            format!("{} removed this project's image.", author(xaction, handles))
        } else {
            format!("{} updated this project's image.", author(xaction, handles))
        }
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Image"
    }
}

/// Membership lock. Needs `Edit` on the project and the application-level
/// lock capability.
pub struct LockedHandler;

#[async_trait]
impl TransactionHandler<Project> for LockedHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(LOCKED)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(Value::Bool(object.is_membership_locked))
    }

    async fn new_value(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        _old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        Ok(submitted
            .as_bool()
            .map_or_else(|| submitted.clone(), Value::Bool))
    }

    async fn validate(
        &self,
        _ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        match pending {
            Some(pending) if pending.new_value.as_bool().is_none() => Ok(vec![ValidationError::invalid(
                custom(LOCKED),
                "Lock must be true or false.",
                Some(pending.new_value.clone()),
            )]),
            _ => Ok(Vec::new()),
        }
    }

    /// Lock holders may toggle the lock on projects they cannot otherwise
    /// edit.
    fn requirements(&self, _: &Project, _: &Actor, _: &PendingTransaction) -> Vec<Requirement> {
        vec![Requirement::Application(Capability::LockProjects)]
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.is_membership_locked = pending.new_value.as_bool().unwrap_or(false);
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        if xaction.new_value.as_bool() == Some(true) {
            format!("{} locked this project's membership.", author(xaction, handles))
        } else {
            format!("{} unlocked this project's membership.", author(xaction, handles))
        }
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, xaction: &Transaction) -> &'static str {
        if xaction.new_value.as_bool() == Some(true) { "Locked" } else { "Unlocked" }
    }
}

/// Parent project. Set only at creation.
pub struct ParentHandler {
    depth_limit: u32,
}

impl ParentHandler {
    pub fn new(depth_limit: u32) -> Self {
        Self { depth_limit }
    }
}

#[async_trait]
impl TransactionHandler<Project> for ParentHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(PARENT)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(object.parent_phid.as_ref().map(ToString::to_string).into())
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        _object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let Some(pending) = pending else {
            return Ok(Vec::new());
        };
        let r#type = custom(PARENT);
        let value = Some(pending.new_value.clone());
        if !ctx.is_new {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "You can only set a parent or milestone when creating a project.",
                value,
            )]);
        }
        let parent = match phid_of(&pending.new_value) {
            Some(phid) => stored_project(ctx, &phid).await?,
            None => None,
        };
        let Some(parent) = parent else {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "Parent must be an existing project.",
                value,
            )]);
        };
        if parent.is_milestone() {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "Milestones can not have subprojects or milestones.",
                value,
            )]);
        }
        if parent.project_depth + 1 >= self.depth_limit {
            return Ok(vec![ValidationError::invalid(
                r#type,
                format!(
                    "You can not create a subproject or milestone under this parent because it would nest projects too deeply. The maximum nesting depth of projects is {}.",
                    self.depth_limit
                ),
                value,
            )]);
        }
        Ok(Vec::new())
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        let parent = phid_of(&pending.new_value);
        let attached = object
            .parent
            .get()
            .and_then(|loaded| loaded.as_ref().map(|p| p.phid.clone()));
        if attached != parent {
            object.parent = Attachment::Unloaded;
        }
        object.parent_phid = parent;
        Ok(())
    }

    fn apply_external(
        &self,
        object: &Project,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        if let Some(parent) = phid_of(&pending.new_value) {
            batch.add_edge(object.phid(), EdgeType::ProjectParent, &parent);
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let parent = phid_of(&xaction.new_value)
            .map(|phid| handles.name(&phid))
            .unwrap_or_default();
        format!(
            "{} created this project under {parent}.",
            author(xaction, handles)
        )
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Created"
    }

    fn required_handles(&self, xaction: &Transaction) -> Vec<Phid> {
        phid_of(&xaction.new_value).into_iter().collect()
    }
}

/// Turns a new subproject into the next numbered milestone of its parent.
/// Submit `true`; the number is `MAX + 1` under the write connection.
pub struct MilestoneHandler;

impl MilestoneHandler {
    fn parent(ctx: &HandlerContext<'_>, object: &Project) -> Option<Phid> {
        ctx.draft(&custom(PARENT))
            .and_then(|draft| phid_of(&draft.value))
            .or_else(|| object.parent_phid.clone())
    }
}

#[async_trait]
impl TransactionHandler<Project> for MilestoneHandler {
    fn transaction_type(&self) -> TransactionType {
        custom(MILESTONE)
    }

    async fn old_value(&self, _ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        Ok(object.milestone_number.map(i64::from).into())
    }

    async fn new_value(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        _old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        if submitted.as_bool() != Some(true) {
            return Ok(submitted.clone());
        }
        let Some(parent) = Self::parent(ctx, object) else {
            return Ok(submitted.clone());
        };
        let max = ctx
            .reader
            .max_scoped_number(INDEX_MILESTONE, parent.as_str())
            .await?;
        Ok(Value::Int(i64::from(max.unwrap_or(0)) + 1))
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let Some(pending) = pending else {
            return Ok(Vec::new());
        };
        let r#type = custom(MILESTONE);
        if !ctx.is_new {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "You can only set a parent or milestone when creating a project.",
                Some(pending.new_value.clone()),
            )]);
        }
        if Self::parent(ctx, object).is_none() {
            return Ok(vec![ValidationError::required(
                r#type,
                "Milestones must have a parent project.",
            )]);
        }
        if pending.new_value.as_int().is_none() {
            return Ok(vec![ValidationError::invalid(
                r#type,
                "Submit true to create a milestone.",
                Some(pending.new_value.clone()),
            )]);
        }
        Ok(Vec::new())
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        object.milestone_number = pending
            .new_value
            .as_int()
            .and_then(|number| u32::try_from(number).ok());
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        format!(
            "{} created this milestone (#{}).",
            author(xaction, handles),
            xaction.new_value.display()
        )
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        "metadata"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Created"
    }
}

/// Member edges. Joining needs `Join`; leaving needs nothing unless the
/// membership is locked; anything else needs `Edit`. Removing a member also
/// drops their watch and subscription.
pub struct MembersHandler {
    inner: EdgeHandler,
}

impl MembersHandler {
    pub fn new() -> Self {
        Self {
            inner: EdgeHandler::new(EdgeType::ProjectMember, "members", "members"),
        }
    }
}

impl Default for MembersHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionHandler<Project> for MembersHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Edge(EdgeType::ProjectMember)
    }

    async fn old_value(&self, ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        TransactionHandler::<Project>::old_value(&self.inner, ctx, object).await
    }

    fn reads_store_on_create(&self) -> bool {
        true
    }

    async fn new_value(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        TransactionHandler::<Project>::new_value(&self.inner, ctx, object, old, submitted).await
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        TransactionHandler::<Project>::has_effect(&self.inner, pending)
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        let mut errors = TransactionHandler::<Project>::validate(&self.inner, ctx, object, pending).await?;
        if let Some(pending) = pending
            && wants_milestone(ctx, object)
            && !EdgeHandler::delta(pending).added.is_empty()
        {
            errors.push(ValidationError::invalid(
                self.transaction_type(),
                "Milestones can not have members; add members to the parent project instead.",
                Some(pending.new_value.clone()),
            ));
        }
        Ok(errors)
    }

    fn requirements(&self, object: &Project, actor: &Actor, pending: &PendingTransaction) -> Vec<Requirement> {
        let delta = EdgeHandler::delta(pending);
        if delta.is_only_adding(actor.phid()) {
            vec![Requirement::Object(Capability::Join)]
        } else if delta.is_only_removing(actor.phid()) {
            if object.is_membership_locked {
                vec![Requirement::Object(Capability::Edit)]
            } else {
                Vec::new()
            }
        } else {
            vec![Requirement::Object(Capability::Edit)]
        }
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        TransactionHandler::<Project>::apply_internal(&self.inner, object, pending)?;
        let removed = EdgeHandler::delta(pending).removed;
        if let Attachment::Loaded(watchers) = &mut object.watchers {
            watchers.retain(|watcher| !removed.contains(watcher));
        }
        Ok(())
    }

    fn apply_external(
        &self,
        object: &Project,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        let delta = EdgeHandler::delta(pending);
        batch.apply_delta(object.phid(), EdgeType::ProjectMember, &delta);
        for user in &delta.added {
            batch.add_edge(object.phid(), EdgeType::ObjectSubscriber, user);
        }
        for user in &delta.removed {
            batch.remove_edge(object.phid(), EdgeType::ObjectWatcher, user);
            batch.remove_edge(object.phid(), EdgeType::ObjectSubscriber, user);
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let delta = edge_delta(xaction);
        if delta.is_only_adding(&xaction.author_phid) {
            format!("{} joined this project.", author(xaction, handles))
        } else if delta.is_only_removing(&xaction.author_phid) {
            format!("{} left this project.", author(xaction, handles))
        } else {
            self.inner.render(xaction, handles)
        }
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        "members"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Members"
    }

    fn required_handles(&self, xaction: &Transaction) -> Vec<Phid> {
        TransactionHandler::<Project>::required_handles(&self.inner, xaction)
    }
}

/// Watcher edges. Watching adds a subscription; unwatching leaves membership
/// alone.
pub struct WatchersHandler {
    inner: EdgeHandler,
}

impl WatchersHandler {
    pub fn new() -> Self {
        Self {
            inner: EdgeHandler::new(EdgeType::ObjectWatcher, "watchers", "watchers"),
        }
    }
}

impl Default for WatchersHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionHandler<Project> for WatchersHandler {
    fn transaction_type(&self) -> TransactionType {
        TransactionType::Edge(EdgeType::ObjectWatcher)
    }

    async fn old_value(&self, ctx: &HandlerContext<'_>, object: &Project) -> Result<Value, EditError> {
        TransactionHandler::<Project>::old_value(&self.inner, ctx, object).await
    }

    fn reads_store_on_create(&self) -> bool {
        true
    }

    async fn new_value(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        old: &Value,
        submitted: &Value,
    ) -> Result<Value, EditError> {
        TransactionHandler::<Project>::new_value(&self.inner, ctx, object, old, submitted).await
    }

    fn has_effect(&self, pending: &PendingTransaction) -> bool {
        TransactionHandler::<Project>::has_effect(&self.inner, pending)
    }

    async fn validate(
        &self,
        ctx: &HandlerContext<'_>,
        object: &Project,
        pending: Option<&PendingTransaction>,
    ) -> Result<Vec<ValidationError>, EditError> {
        TransactionHandler::<Project>::validate(&self.inner, ctx, object, pending).await
    }

    fn requirements(&self, _object: &Project, actor: &Actor, pending: &PendingTransaction) -> Vec<Requirement> {
        EdgeHandler::self_service_requirements(actor, pending, Capability::View)
    }

    fn apply_internal(&self, object: &mut Project, pending: &PendingTransaction) -> Result<(), EditError> {
        TransactionHandler::<Project>::apply_internal(&self.inner, object, pending)
    }

    fn apply_external(
        &self,
        object: &Project,
        pending: &PendingTransaction,
        batch: &mut WriteBatch,
    ) -> Result<(), EditError> {
        let delta = EdgeHandler::delta(pending);
        batch.apply_delta(object.phid(), EdgeType::ObjectWatcher, &delta);
        for user in &delta.added {
            batch.add_edge(object.phid(), EdgeType::ObjectSubscriber, user);
        }
        Ok(())
    }

    fn title(&self, xaction: &Transaction, handles: &HandleMap) -> String {
        let delta = edge_delta(xaction);
        if delta.is_only_adding(&xaction.author_phid) {
            format!("{} started watching this project.", author(xaction, handles))
        } else if delta.is_only_removing(&xaction.author_phid) {
            format!("{} stopped watching this project.", author(xaction, handles))
        } else {
            self.inner.render(xaction, handles)
        }
    }

    fn should_hide(&self, _xaction: &Transaction) -> bool {
        false
    }

    fn mail_tag(&self) -> &'static str {
        "watchers"
    }

    fn action_name(&self, _xaction: &Transaction) -> &'static str {
        "Changed Watchers"
    }

    fn required_handles(&self, xaction: &Transaction) -> Vec<Phid> {
        TransactionHandler::<Project>::required_handles(&self.inner, xaction)
    }
}

fn edge_delta(xaction: &Transaction) -> EdgeDelta {
    EdgeDelta::between(
        &xaction.old_value.to_phid_set().unwrap_or_default(),
        &xaction.new_value.to_phid_set().unwrap_or_default(),
    )
}
