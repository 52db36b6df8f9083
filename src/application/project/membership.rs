use crate::domain::batch::WriteBatch;
use crate::domain::edge::{EdgeDelta, EdgeType};
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::ports::{MembershipIndex, StoreHandle, StoreRead};
use crate::domain::project::Project;
use crate::error::{EffectError, StorageError};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

/// Bounds ancestor and descendant walks so a corrupt graph cannot loop.
const MAX_WALK: usize = 64;

/// Maintains `project.materialized-member` edges: the effective members of a
/// project once subprojects and milestones are taken into account.
///
/// A project with subprojects is made of the members of its leaf
/// descendants; a milestone has the members of its parent; any other project
/// has its direct members.
#[derive(Clone)]
pub struct MembershipIndexer {
    store: StoreHandle,
}

impl MembershipIndexer {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Rebuilds the index of `project`, its ancestors and their milestones in
    /// one write.
    pub async fn rebuild(&self, project: &Phid) -> Result<(), StorageError> {
        let txn = self.store.begin_write().await?;
        let reader: &dyn StoreRead = &*txn;

        let mut targets = Vec::new();
        let mut current = Some(project.clone());
        while let Some(phid) = current.take() {
            if targets.len() >= MAX_WALK || targets.contains(&phid) {
                break;
            }
            for child in reader.edge_destinations(&phid, EdgeType::ProjectChild).await? {
                if load(reader, &child).await?.is_some_and(|p| p.is_milestone()) {
                    targets.push(child);
                }
            }
            current = reader
                .edge_destinations(&phid, EdgeType::ProjectParent)
                .await?
                .into_iter()
                .next();
            targets.push(phid);
        }

        let mut batch = WriteBatch::new();
        for phid in &targets {
            let wanted = materialized_members(reader, phid).await?;
            let stored = reader
                .edge_destinations(phid, EdgeType::ProjectMaterializedMember)
                .await?;
            let delta = EdgeDelta::between(&stored, &wanted);
            if !delta.is_empty() {
                debug!(project = %phid, added = delta.added.len(), removed = delta.removed.len(), "rematerializing members");
                batch.apply_delta(phid, EdgeType::ProjectMaterializedMember, &delta);
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        txn.commit(batch).await
    }
}

#[async_trait]
impl MembershipIndex for MembershipIndexer {
    async fn rematerialize(&self, project: &Phid) -> Result<(), EffectError> {
        Ok(self.rebuild(project).await?)
    }
}

async fn load(reader: &dyn StoreRead, phid: &Phid) -> Result<Option<Project>, StorageError> {
    match reader.object(phid).await? {
        Some(record) if record.kind == Project::KIND => Ok(Some(record.decode::<Project>()?)),
        _ => Ok(None),
    }
}

async fn materialized_members(
    reader: &dyn StoreRead,
    project: &Phid,
) -> Result<BTreeSet<Phid>, StorageError> {
    let mut root = project.clone();
    if let Some(loaded) = load(reader, project).await?
        && loaded.is_milestone()
        && let Some(parent) = loaded.parent_phid
    {
        root = parent;
    }

    let mut members = BTreeSet::new();
    let mut stack = vec![root];
    let mut seen = BTreeSet::new();
    while let Some(phid) = stack.pop() {
        if !seen.insert(phid.clone()) || seen.len() > MAX_WALK * 16 {
            continue;
        }
        let mut subprojects = Vec::new();
        for child in reader.edge_destinations(&phid, EdgeType::ProjectChild).await? {
            if load(reader, &child).await?.is_some_and(|p| !p.is_milestone()) {
                subprojects.push(child);
            }
        }
        if subprojects.is_empty() {
            members.extend(reader.edge_destinations(&phid, EdgeType::ProjectMember).await?);
        } else {
            stack.extend(subprojects);
        }
    }
    Ok(members)
}
