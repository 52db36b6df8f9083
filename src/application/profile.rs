use crate::application::handler::HandlerRegistry;
use crate::domain::effect::Effect;
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, ApplicationPolicy};
use crate::domain::ports::StoreRead;
use crate::domain::transaction::Transaction;
use crate::error::{EditError, StorageError};
use async_trait::async_trait;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub to: BTreeSet<Phid>,
    pub cc: BTreeSet<Phid>,
}

/// Everything the generic editor needs to know about one object kind.
#[async_trait]
pub trait EditorProfile<O: EditableObject>: Send + Sync {
    fn registry(&self) -> &HandlerRegistry<O>;

    /// A new, unsaved object with defaults and empty relations.
    fn initialize(&self, actor: &Actor) -> O;

    /// Loads a stored object with its relations attached.
    async fn load(&self, reader: &dyn StoreRead, phid: &Phid) -> Result<Option<O>, EditError>;

    fn application_policy(&self) -> &ApplicationPolicy;

    /// Loads whatever the object's own pre-persist hook needs, then runs it.
    async fn prepare_persist(&self, _reader: &dyn StoreRead, object: &mut O) -> Result<(), EditError> {
        object.prepare_persist()?;
        Ok(())
    }

    /// Subject prefix, e.g. `[Project]`.
    fn mail_prefix(&self) -> &'static str;

    fn object_uri(&self, object: &O) -> String;

    fn should_send_mail(&self, _object: &O, _xactions: &[Transaction]) -> bool {
        true
    }

    fn should_publish_feed(&self, _object: &O, _xactions: &[Transaction]) -> bool {
        true
    }

    async fn mail_recipients(
        &self,
        reader: &dyn StoreRead,
        object: &O,
        actor: &Actor,
    ) -> Result<Recipients, StorageError>;

    /// Kind-specific effects on top of mail, feed and reindex.
    fn extra_effects(&self, _object: &O, _xactions: &[Transaction]) -> Vec<Effect> {
        Vec::new()
    }
}
