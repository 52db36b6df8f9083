use super::resolve::{Mutations, plan};
use crate::domain::batch::WriteBatch;
use crate::domain::edge::EdgeType;
use crate::domain::object::{ObjectRecord, UniqueKey};
use crate::domain::phid::Phid;
use crate::domain::ports::{Store, StoreRead, WriteTxn};
use crate::domain::transaction::Transaction;
use crate::error::StorageError;
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for object rows, keyed by PHID.
pub const CF_OBJECTS: &str = "objects";
/// Column Family for transactions, keyed by `<object>/<sequence>`.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for edges, keyed by `<src>|<type>|<dst>` with empty values.
pub const CF_EDGES: &str = "edges";
/// Column Family for unique keys, keyed by `<index>|<key>`; the value is the owner.
pub const CF_KEYS: &str = "keys";

/// A persistent store implementation using RocksDB.
///
/// Every commit is a single RocksDB write batch, so an edit lands completely
/// or not at all. Writers serialize on a process-wide mutex.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

fn transaction_key(object: &Phid, sequence: u64) -> String {
    format!("{object}/{sequence:020}")
}

fn edge_prefix(src: &Phid, edge_type: EdgeType) -> String {
    format!("{src}|{}|", edge_type.name())
}

fn key_key(index: &str, key: &str) -> String {
    format!("{index}|{key}")
}

fn parse_phid(bytes: &[u8]) -> Result<Phid, StorageError> {
    let text = std::str::from_utf8(bytes).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    Phid::parse(text).map_err(|e| StorageError::Corrupt(e.to_string()))
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that every column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_OBJECTS, CF_TRANSACTIONS, CF_EDGES, CF_KEYS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::Corrupt(format!("{name} column family not found")))
    }

    /// Key/value pairs of `cf` whose key starts with `prefix`.
    fn scan(&self, cf: &str, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let handle = self.cf(cf)?;
        let iter = self.db.iterator_cf(
            handle,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.into_vec())
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            rows.push((key, value.into_vec()));
        }
        Ok(rows)
    }

    fn write(&self, mutations: Mutations) -> Result<(), StorageError> {
        let objects = self.cf(CF_OBJECTS)?;
        let transactions = self.cf(CF_TRANSACTIONS)?;
        let edges = self.cf(CF_EDGES)?;
        let keys = self.cf(CF_KEYS)?;

        let mut batch = rocksdb::WriteBatch::default();
        for (phid, record) in mutations.objects {
            match record {
                Some(record) => batch.put_cf(objects, phid.as_str(), serde_json::to_vec(&record)?),
                None => batch.delete_cf(objects, phid.as_str()),
            }
        }
        for ((object, sequence), xaction) in mutations.transactions {
            let key = transaction_key(&object, sequence);
            match xaction {
                Some(xaction) => batch.put_cf(transactions, key, serde_json::to_vec(&xaction)?),
                None => batch.delete_cf(transactions, key),
            }
        }
        for ((src, edge_type, dst), present) in mutations.edges {
            let key = format!("{}{dst}", edge_prefix(&src, edge_type));
            if present {
                batch.put_cf(edges, key, b"");
            } else {
                batch.delete_cf(edges, key);
            }
        }
        for (key, owner) in mutations.keys {
            let row = key_key(&key.index, &key.key);
            match owner {
                Some(owner) => batch.put_cf(keys, row, owner.as_str()),
                None => batch.delete_cf(keys, row),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl StoreRead for RocksDBStore {
    async fn object(&self, phid: &Phid) -> Result<Option<ObjectRecord>, StorageError> {
        match self.db.get_cf(self.cf(CF_OBJECTS)?, phid.as_str())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn transactions(&self, object: &Phid) -> Result<Vec<Transaction>, StorageError> {
        self.scan(CF_TRANSACTIONS, &format!("{object}/"))?
            .into_iter()
            .map(|(_, value)| Ok(serde_json::from_slice(&value)?))
            .collect()
    }

    async fn edge_destinations(
        &self,
        src: &Phid,
        edge_type: EdgeType,
    ) -> Result<BTreeSet<Phid>, StorageError> {
        let prefix = edge_prefix(src, edge_type);
        self.scan(CF_EDGES, &prefix)?
            .into_iter()
            .map(|(key, _)| parse_phid(key[prefix.len()..].as_bytes()))
            .collect()
    }

    async fn key_owner(&self, index: &str, key: &str) -> Result<Option<Phid>, StorageError> {
        match self.db.get_cf(self.cf(CF_KEYS)?, key_key(index, key))? {
            Some(bytes) => Ok(Some(parse_phid(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn keys_owned(&self, index: &str, owner: &Phid) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{index}|");
        Ok(self
            .scan(CF_KEYS, &prefix)?
            .into_iter()
            .filter(|(_, value)| value.as_slice() == owner.as_str().as_bytes())
            .map(|(key, _)| key[prefix.len()..].to_string())
            .collect())
    }

    async fn keys_owned_by(&self, owner: &Phid) -> Result<Vec<UniqueKey>, StorageError> {
        Ok(self
            .scan(CF_KEYS, "")?
            .into_iter()
            .filter(|(_, value)| value.as_slice() == owner.as_str().as_bytes())
            .filter_map(|(row, _)| {
                row.split_once('|')
                    .map(|(index, key)| UniqueKey::new(index, key))
            })
            .collect())
    }

    async fn max_scoped_number(
        &self,
        index: &str,
        scope: &str,
    ) -> Result<Option<u32>, StorageError> {
        let prefix = key_key(index, &format!("{scope}/"));
        Ok(self
            .scan(CF_KEYS, &prefix)?
            .into_iter()
            .filter_map(|(key, _)| key[prefix.len()..].parse::<u32>().ok())
            .max())
    }
}

#[async_trait]
impl Store for RocksDBStore {
    async fn begin_write(&self) -> Result<Box<dyn WriteTxn>, StorageError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDBWriteTxn {
            store: self.clone(),
            _guard: guard,
        }))
    }
}

pub struct RocksDBWriteTxn {
    store: RocksDBStore,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl StoreRead for RocksDBWriteTxn {
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
impl WriteTxn for RocksDBWriteTxn {
    async fn commit(self: Box<Self>, batch: WriteBatch) -> Result<(), StorageError> {
        let mutations = plan(&*self, batch).await?;
        self.store.write(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::KeyConflict;
    use tempfile::tempdir;

    fn p(s: &str) -> Phid {
        Phid::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        for cf in [CF_OBJECTS, CF_TRANSACTIONS, CF_EDGES, CF_KEYS] {
            assert!(store.db.cf_handle(cf).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_edges_and_keys_survive_reopen() {
        let dir = tempdir().unwrap();
        let (project, user) = (p("PHID-PROJ-a"), p("PHID-USER-b"));
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            let txn = store.begin_write().await.unwrap();
            let mut batch = WriteBatch::new();
            batch.add_edge(&project, EdgeType::ProjectMember, &user);
            batch.claim_key(UniqueKey::new("project.slug", "alpha"), &project, KeyConflict::Fail);
            txn.commit(batch).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        let members = store
            .edge_destinations(&project, EdgeType::ProjectMember)
            .await
            .unwrap();
        assert_eq!(members.into_iter().collect::<Vec<_>>(), vec![user.clone()]);
        assert!(
            store
                .edge_destinations(&user, EdgeType::MemberOfProject)
                .await
                .unwrap()
                .contains(&project)
        );
        assert_eq!(
            store.keys_owned("project.slug", &project).await.unwrap(),
            vec!["alpha".to_string()]
        );
        assert_eq!(store.keys_owned_by(&project).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_destroy_removes_edges_both_ways() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let (project, user) = (p("PHID-PROJ-a"), p("PHID-USER-b"));

        let txn = store.begin_write().await.unwrap();
        let mut batch = WriteBatch::new();
        batch.add_edge(&project, EdgeType::ObjectWatcher, &user);
        txn.commit(batch).await.unwrap();

        let txn = store.begin_write().await.unwrap();
        let mut batch = WriteBatch::new();
        batch.destroy(&project);
        txn.commit(batch).await.unwrap();

        assert!(
            store
                .edge_destinations(&user, EdgeType::WatcherForObject)
                .await
                .unwrap()
                .is_empty()
        );
    }
}
