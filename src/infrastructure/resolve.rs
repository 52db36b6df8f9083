//! Turns a [`WriteBatch`] into concrete row mutations against committed state.
//!
//! Both storage backends commit through [`plan`], so unique-key, cardinality
//! and destroy semantics are identical for them. Planning only reads; nothing
//! is written unless the whole plan succeeds.

use crate::domain::batch::{EdgeKey, EdgeOp, KeyConflict, KeyOp, WriteBatch};
use crate::domain::edge::{Cardinality, EdgeType};
use crate::domain::object::{ObjectRecord, UniqueKey};
use crate::domain::phid::Phid;
use crate::domain::ports::StoreRead;
use crate::domain::transaction::Transaction;
use crate::error::StorageError;
use std::collections::{BTreeMap, BTreeSet};

/// Final state of every row a batch touches. `None` / `false` means delete.
#[derive(Debug, Default)]
pub struct Mutations {
    pub objects: BTreeMap<Phid, Option<ObjectRecord>>,
    pub transactions: BTreeMap<(Phid, u64), Option<Transaction>>,
    pub edges: BTreeMap<EdgeKey, bool>,
    pub keys: BTreeMap<UniqueKey, Option<Phid>>,
}

impl Mutations {
    async fn key_owner(
        &self,
        reader: &dyn StoreRead,
        key: &UniqueKey,
    ) -> Result<Option<Phid>, StorageError> {
        match self.keys.get(key) {
            Some(owner) => Ok(owner.clone()),
            None => reader.key_owner(&key.index, &key.key).await,
        }
    }

    async fn claim(
        &mut self,
        reader: &dyn StoreRead,
        key: &UniqueKey,
        owner: &Phid,
        on_conflict: KeyConflict,
    ) -> Result<(), StorageError> {
        match self.key_owner(reader, key).await? {
            None => {
                self.keys.insert(key.clone(), Some(owner.clone()));
            }
            Some(current) if &current == owner => {}
            Some(_) if on_conflict == KeyConflict::Skip => {}
            Some(current) => {
                return Err(StorageError::UniqueViolation {
                    index: key.index.clone(),
                    key: key.key.clone(),
                    owner: current,
                });
            }
        }
        Ok(())
    }

    async fn release(
        &mut self,
        reader: &dyn StoreRead,
        key: &UniqueKey,
        owner: &Phid,
    ) -> Result<(), StorageError> {
        if self.key_owner(reader, key).await?.as_ref() == Some(owner) {
            self.keys.insert(key.clone(), None);
        }
        Ok(())
    }
}

pub async fn plan(reader: &dyn StoreRead, batch: WriteBatch) -> Result<Mutations, StorageError> {
    let mut mutations = Mutations::default();

    if let Some(record) = batch.object() {
        let previous = reader
            .object(&record.phid)
            .await?
            .map(|old| old.keys)
            .unwrap_or_default();
        for key in previous.iter().filter(|key| !record.keys.contains(key)) {
            mutations.release(reader, key, &record.phid).await?;
        }
        for key in &record.keys {
            mutations
                .claim(reader, key, &record.phid, KeyConflict::Fail)
                .await?;
        }
        mutations
            .objects
            .insert(record.phid.clone(), Some(record.clone()));
    }

    for op in batch.key_ops() {
        match op {
            KeyOp::Claim {
                key,
                owner,
                on_conflict,
            } => mutations.claim(reader, key, owner, *on_conflict).await?,
            KeyOp::Release { key, owner } => mutations.release(reader, key, owner).await?,
        }
    }

    for (key, op) in batch.edges() {
        mutations.edges.insert(key.clone(), op == EdgeOp::Add);
    }
    check_cardinality(reader, &mutations.edges).await?;

    for xaction in batch.transactions() {
        mutations.transactions.insert(
            (xaction.object_phid.clone(), xaction.sequence),
            Some(xaction.clone()),
        );
    }

    for flag in batch.hidden() {
        let stored = reader.transactions(&flag.object).await?;
        let Some(mut xaction) = stored.into_iter().find(|x| x.phid == flag.transaction) else {
            return Err(StorageError::Corrupt(format!(
                "transaction {} of {} does not exist",
                flag.transaction, flag.object
            )));
        };
        xaction.hidden = flag.hidden;
        mutations
            .transactions
            .insert((flag.object.clone(), xaction.sequence), Some(xaction));
    }

    for phid in batch.destroyed() {
        destroy(reader, &mut mutations, phid).await?;
    }

    Ok(mutations)
}

async fn check_cardinality(
    reader: &dyn StoreRead,
    edges: &BTreeMap<EdgeKey, bool>,
) -> Result<(), StorageError> {
    let touched: BTreeSet<(&Phid, EdgeType)> = edges
        .iter()
        .filter(|((_, edge_type, _), added)| **added && edge_type.cardinality() == Cardinality::One)
        .map(|((src, edge_type, _), _)| (src, *edge_type))
        .collect();
    for (src, edge_type) in touched {
        let mut destinations = reader.edge_destinations(src, edge_type).await?;
        for ((s, t, dst), added) in edges {
            if s == src && *t == edge_type {
                if *added {
                    destinations.insert(dst.clone());
                } else {
                    destinations.remove(dst);
                }
            }
        }
        if destinations.len() > 1 {
            return Err(StorageError::CardinalityViolation {
                src: src.clone(),
                edge_type: edge_type.name().to_string(),
            });
        }
    }
    Ok(())
}

async fn destroy(
    reader: &dyn StoreRead,
    mutations: &mut Mutations,
    phid: &Phid,
) -> Result<(), StorageError> {
    mutations.objects.insert(phid.clone(), None);
    for xaction in reader.transactions(phid).await? {
        mutations
            .transactions
            .insert((phid.clone(), xaction.sequence), None);
    }
    for key in reader.keys_owned_by(phid).await? {
        mutations.keys.insert(key, None);
    }
    for edge_type in EdgeType::ALL {
        for dst in reader.edge_destinations(phid, edge_type).await? {
            if let Some(inverse) = edge_type.inverse() {
                mutations
                    .edges
                    .insert((dst.clone(), inverse, phid.clone()), false);
            }
            mutations.edges.insert((phid.clone(), edge_type, dst), false);
        }
    }
    Ok(())
}
