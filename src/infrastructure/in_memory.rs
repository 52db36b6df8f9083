use super::resolve::{Mutations, plan};
use crate::domain::batch::WriteBatch;
use crate::domain::edge::EdgeType;
use crate::domain::object::{ObjectRecord, UniqueKey};
use crate::domain::phid::Phid;
use crate::domain::ports::{Store, StoreRead, WriteTxn};
use crate::domain::transaction::Transaction;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct State {
    objects: HashMap<Phid, ObjectRecord>,
    transactions: HashMap<Phid, BTreeMap<u64, Transaction>>,
    edges: HashMap<(Phid, EdgeType), BTreeSet<Phid>>,
    keys: BTreeMap<String, BTreeMap<String, Phid>>,
}

impl State {
    fn apply(&mut self, mutations: Mutations) {
        for (phid, record) in mutations.objects {
            match record {
                Some(record) => {
                    self.objects.insert(phid, record);
                }
                None => {
                    self.objects.remove(&phid);
                }
            }
        }
        for ((object, sequence), xaction) in mutations.transactions {
            let history = self.transactions.entry(object).or_default();
            match xaction {
                Some(xaction) => {
                    history.insert(sequence, xaction);
                }
                None => {
                    history.remove(&sequence);
                }
            }
        }
        self.transactions.retain(|_, history| !history.is_empty());
        for ((src, edge_type, dst), present) in mutations.edges {
            let destinations = self.edges.entry((src, edge_type)).or_default();
            if present {
                destinations.insert(dst);
            } else {
                destinations.remove(&dst);
            }
        }
        self.edges.retain(|_, destinations| !destinations.is_empty());
        for (key, owner) in mutations.keys {
            let index = self.keys.entry(key.index).or_default();
            match owner {
                Some(owner) => {
                    index.insert(key.key, owner);
                }
                None => {
                    index.remove(&key.key);
                }
            }
        }
        self.keys.retain(|_, index| !index.is_empty());
    }
}

/// A thread-safe in-memory store.
///
/// Reads share an `RwLock`; writers additionally serialize on a mutex held for
/// the whole read-validate-commit cycle of an edit. Ideal for testing or when
/// persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreRead for InMemoryStore {
    async fn object(&self, phid: &Phid) -> Result<Option<ObjectRecord>, StorageError> {
        Ok(self.state.read().await.objects.get(phid).cloned())
    }

    async fn transactions(&self, object: &Phid) -> Result<Vec<Transaction>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .get(object)
            .map(|history| history.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn edge_destinations(
        &self,
        src: &Phid,
        edge_type: EdgeType,
    ) -> Result<BTreeSet<Phid>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .edges
            .get(&(src.clone(), edge_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn key_owner(&self, index: &str, key: &str) -> Result<Option<Phid>, StorageError> {
        let state = self.state.read().await;
        Ok(state.keys.get(index).and_then(|keys| keys.get(key)).cloned())
    }

    async fn keys_owned(&self, index: &str, owner: &Phid) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .get(index)
            .map(|keys| {
                keys.iter()
                    .filter(|(_, holder)| *holder == owner)
                    .map(|(key, _)| key.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn keys_owned_by(&self, owner: &Phid) -> Result<Vec<UniqueKey>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .keys
            .iter()
            .flat_map(|(index, keys)| {
                keys.iter()
                    .filter(|(_, holder)| *holder == owner)
                    .map(move |(key, _)| UniqueKey::new(index.clone(), key.clone()))
            })
            .collect())
    }

    async fn max_scoped_number(
        &self,
        index: &str,
        scope: &str,
    ) -> Result<Option<u32>, StorageError> {
        let state = self.state.read().await;
        let prefix = format!("{scope}/");
        Ok(state.keys.get(index).and_then(|keys| {
            keys.keys()
                .filter_map(|key| key.strip_prefix(&prefix)?.parse::<u32>().ok())
                .max()
        }))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin_write(&self) -> Result<Box<dyn WriteTxn>, StorageError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(InMemoryWriteTxn {
            store: self.clone(),
            _guard: guard,
        }))
    }
}

/// Holds the writer lock until committed or dropped.
pub struct InMemoryWriteTxn {
    store: InMemoryStore,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreRead for InMemoryWriteTxn {
    async fn object(&self, phid: &Phid) -> Result<Option<ObjectRecord>, StorageError> {
        self.store.object(phid).await
    }

    async fn transactions(&self, object: &Phid) -> Result<Vec<Transaction>, StorageError> {
        self.store.transactions(object).await
    }

    async fn edge_destinations(
        &self,
        src: &Phid,
        edge_type: EdgeType,
    ) -> Result<BTreeSet<Phid>, StorageError> {
        self.store.edge_destinations(src, edge_type).await
    }

    async fn key_owner(&self, index: &str, key: &str) -> Result<Option<Phid>, StorageError> {
        self.store.key_owner(index, key).await
    }

    async fn keys_owned(&self, index: &str, owner: &Phid) -> Result<Vec<String>, StorageError> {
        self.store.keys_owned(index, owner).await
    }

    async fn keys_owned_by(&self, owner: &Phid) -> Result<Vec<UniqueKey>, StorageError> {
        self.store.keys_owned_by(owner).await
    }

    async fn max_scoped_number(
        &self,
        index: &str,
        scope: &str,
    ) -> Result<Option<u32>, StorageError> {
        self.store.max_scoped_number(index, scope).await
    }
}

#[async_trait]
impl WriteTxn for InMemoryWriteTxn {
    async fn commit(self: Box<Self>, batch: WriteBatch) -> Result<(), StorageError> {
        let mutations = plan(&*self, batch).await?;
        self.store.state.write().await.apply(mutations);
        Ok(())
    }
}
