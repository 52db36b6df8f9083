use crate::application::handler::HandlerRegistry;
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::ports::StoreRead;
use crate::domain::transaction::Transaction;
use crate::error::StorageError;
use std::collections::{BTreeMap, BTreeSet};

/// Display names of PHIDs, loaded up front so rendering never touches the
/// store.
#[derive(Debug, Clone, Default)]
pub struct HandleMap {
    names: BTreeMap<Phid, String>,
}

impl HandleMap {
    pub async fn load(
        reader: &dyn StoreRead,
        phids: impl IntoIterator<Item = Phid>,
    ) -> Result<Self, StorageError> {
        let mut names = BTreeMap::new();
        for phid in phids.into_iter().collect::<BTreeSet<_>>() {
            if let Some(record) = reader.object(&phid).await? {
                names.insert(phid, record.name);
            }
        }
        Ok(Self { names })
    }

    pub fn insert(&mut self, phid: Phid, name: impl Into<String>) {
        self.names.insert(phid, name.into());
    }

    /// Unknown PHIDs render as themselves.
    pub fn name(&self, phid: &Phid) -> String {
        self.names
            .get(phid)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| phid.to_string())
    }
}

/// Renders persisted transactions through their kind's handlers.
pub struct TransactionRenderer<'a, O: EditableObject> {
    registry: &'a HandlerRegistry<O>,
    handles: &'a HandleMap,
}

impl<'a, O: EditableObject> TransactionRenderer<'a, O> {
    pub fn new(registry: &'a HandlerRegistry<O>, handles: &'a HandleMap) -> Self {
        Self { registry, handles }
    }

    /// Every PHID the given transactions need a handle for.
    pub fn required_handles(registry: &HandlerRegistry<O>, xactions: &[Transaction]) -> BTreeSet<Phid> {
        let mut phids = BTreeSet::new();
        for xaction in xactions {
            phids.insert(xaction.author_phid.clone());
            phids.insert(xaction.object_phid.clone());
            if let Some(handler) = registry.get(&xaction.r#type) {
                phids.extend(handler.required_handles(xaction));
            }
        }
        phids
    }

    pub fn title(&self, xaction: &Transaction) -> String {
        match self.registry.get(&xaction.r#type) {
            Some(handler) => handler.title(xaction, self.handles),
            None => format!(
                "{} edited {}.",
                self.handles.name(&xaction.author_phid),
                xaction.r#type
            ),
        }
    }

    pub fn title_for_feed(&self, xaction: &Transaction) -> String {
        let object_name = self.handles.name(&xaction.object_phid);
        match self.registry.get(&xaction.r#type) {
            Some(handler) => handler.title_for_feed(xaction, self.handles, &object_name),
            None => self.title(xaction),
        }
    }

    pub fn should_hide(&self, xaction: &Transaction) -> bool {
        xaction.hidden
            || self
                .registry
                .get(&xaction.r#type)
                .is_some_and(|handler| handler.should_hide(xaction))
    }

    pub fn mail_tags(&self, xactions: &[Transaction]) -> BTreeSet<String> {
        xactions
            .iter()
            .filter_map(|xaction| self.registry.get(&xaction.r#type))
            .map(|handler| handler.mail_tag().to_string())
            .collect()
    }

    /// The action of the most significant visible transaction, used in mail
    /// subjects.
    pub fn action_name(&self, xactions: &[Transaction]) -> &'static str {
        xactions
            .iter()
            .filter(|xaction| !self.should_hide(xaction))
            .find_map(|xaction| {
                self.registry
                    .get(&xaction.r#type)
                    .map(|handler| handler.action_name(xaction))
            })
            .unwrap_or("Edited")
    }
}
