use super::edge::{EdgeDelta, EdgeType};
use super::object::{ObjectRecord, UniqueKey};
use super::phid::Phid;
use super::transaction::Transaction;
use std::collections::BTreeMap;

/// What to do when a claimed key is already held by another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConflict {
    Skip,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOp {
    Claim {
        key: UniqueKey,
        owner: Phid,
        on_conflict: KeyConflict,
    },
    /// Only releases the key if `owner` still holds it.
    Release { key: UniqueKey, owner: Phid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOp {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenFlag {
    pub object: Phid,
    pub transaction: Phid,
    pub hidden: bool,
}

pub type EdgeKey = (Phid, EdgeType, Phid);

/// Everything one edit writes, committed atomically by a `WriteTxn`.
///
/// Edge operations are keyed by `(src, type, dst)`; a later operation on the
/// same triple replaces the earlier one.
#[derive(Debug, Default)]
pub struct WriteBatch {
    object: Option<ObjectRecord>,
    transactions: Vec<Transaction>,
    edges: BTreeMap<EdgeKey, EdgeOp>,
    key_ops: Vec<KeyOp>,
    hidden: Vec<HiddenFlag>,
    destroy: Vec<Phid>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&mut self, record: ObjectRecord) {
        self.object = Some(record);
    }

    pub fn push_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    pub fn add_edge(&mut self, src: &Phid, edge_type: EdgeType, dst: &Phid) {
        self.edge_op(src, edge_type, dst, EdgeOp::Add);
    }

    pub fn remove_edge(&mut self, src: &Phid, edge_type: EdgeType, dst: &Phid) {
        self.edge_op(src, edge_type, dst, EdgeOp::Remove);
    }

    pub fn apply_delta(&mut self, src: &Phid, edge_type: EdgeType, delta: &EdgeDelta) {
        for dst in &delta.added {
            self.add_edge(src, edge_type, dst);
        }
        for dst in &delta.removed {
            self.remove_edge(src, edge_type, dst);
        }
    }

    fn edge_op(&mut self, src: &Phid, edge_type: EdgeType, dst: &Phid, op: EdgeOp) {
        self.edges
            .insert((src.clone(), edge_type, dst.clone()), op);
        if let Some(inverse) = edge_type.inverse() {
            self.edges.insert((dst.clone(), inverse, src.clone()), op);
        }
    }

    pub fn claim_key(&mut self, key: UniqueKey, owner: &Phid, on_conflict: KeyConflict) {
        self.key_ops.push(KeyOp::Claim {
            key,
            owner: owner.clone(),
            on_conflict,
        });
    }

    pub fn release_key(&mut self, key: UniqueKey, owner: &Phid) {
        self.key_ops.push(KeyOp::Release {
            key,
            owner: owner.clone(),
        });
    }

    pub fn set_hidden(&mut self, object: &Phid, transaction: &Phid, hidden: bool) {
        self.hidden.push(HiddenFlag {
            object: object.clone(),
            transaction: transaction.clone(),
            hidden,
        });
    }

    /// Deletes the object row, its transactions, owned keys and every edge
    /// touching it.
    pub fn destroy(&mut self, phid: &Phid) {
        self.destroy.push(phid.clone());
    }

    pub fn object(&self) -> Option<&ObjectRecord> {
        self.object.as_ref()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn edges(&self) -> impl Iterator<Item = (&EdgeKey, EdgeOp)> {
        self.edges.iter().map(|(key, op)| (key, *op))
    }

    pub fn key_ops(&self) -> &[KeyOp] {
        &self.key_ops
    }

    pub fn hidden(&self) -> &[HiddenFlag] {
        &self.hidden
    }

    pub fn destroyed(&self) -> &[Phid] {
        &self.destroy
    }

    pub fn is_empty(&self) -> bool {
        self.object.is_none()
            && self.transactions.is_empty()
            && self.edges.is_empty()
            && self.key_ops.is_empty()
            && self.hidden.is_empty()
            && self.destroy.is_empty()
    }
}
