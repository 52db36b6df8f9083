use super::phid::Phid;
use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Typed directed relationship between two PHIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "project.member")]
    ProjectMember,
    #[serde(rename = "user.member-of-project")]
    MemberOfProject,
    #[serde(rename = "object.watcher")]
    ObjectWatcher,
    #[serde(rename = "user.watching")]
    WatcherForObject,
    #[serde(rename = "object.subscriber")]
    ObjectSubscriber,
    #[serde(rename = "user.subscribed-to")]
    SubscribedToObject,
    #[serde(rename = "project.parent")]
    ProjectParent,
    #[serde(rename = "project.child")]
    ProjectChild,
    #[serde(rename = "project.materialized-member")]
    ProjectMaterializedMember,
}

impl EdgeType {
    pub const ALL: [EdgeType; 9] = [
        EdgeType::ProjectMember,
        EdgeType::MemberOfProject,
        EdgeType::ObjectWatcher,
        EdgeType::WatcherForObject,
        EdgeType::ObjectSubscriber,
        EdgeType::SubscribedToObject,
        EdgeType::ProjectParent,
        EdgeType::ProjectChild,
        EdgeType::ProjectMaterializedMember,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EdgeType::ProjectMember => "project.member",
            EdgeType::MemberOfProject => "user.member-of-project",
            EdgeType::ObjectWatcher => "object.watcher",
            EdgeType::WatcherForObject => "user.watching",
            EdgeType::ObjectSubscriber => "object.subscriber",
            EdgeType::SubscribedToObject => "user.subscribed-to",
            EdgeType::ProjectParent => "project.parent",
            EdgeType::ProjectChild => "project.child",
            EdgeType::ProjectMaterializedMember => "project.materialized-member",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// The edge written in the opposite direction whenever this one changes.
    pub fn inverse(&self) -> Option<EdgeType> {
        match self {
            EdgeType::ProjectMember => Some(EdgeType::MemberOfProject),
            EdgeType::MemberOfProject => Some(EdgeType::ProjectMember),
            EdgeType::ObjectWatcher => Some(EdgeType::WatcherForObject),
            EdgeType::WatcherForObject => Some(EdgeType::ObjectWatcher),
            EdgeType::ObjectSubscriber => Some(EdgeType::SubscribedToObject),
            EdgeType::SubscribedToObject => Some(EdgeType::ObjectSubscriber),
            EdgeType::ProjectParent => Some(EdgeType::ProjectChild),
            EdgeType::ProjectChild => Some(EdgeType::ProjectParent),
            EdgeType::ProjectMaterializedMember => None,
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            EdgeType::ProjectParent => Cardinality::One,
            _ => Cardinality::Many,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Submitted edge change: replace (`=`), then add (`+`), then remove (`-`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeSpec {
    pub set: Option<BTreeSet<Phid>>,
    pub add: BTreeSet<Phid>,
    pub remove: BTreeSet<Phid>,
}

impl EdgeSpec {
    pub fn adding(phids: impl IntoIterator<Item = Phid>) -> Self {
        Self {
            add: phids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn removing(phids: impl IntoIterator<Item = Phid>) -> Self {
        Self {
            remove: phids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn replacing(phids: impl IntoIterator<Item = Phid>) -> Self {
        Self {
            set: Some(phids.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Accepts `{"+": [...], "-": [...], "=": [...]}` or a bare list (`=`).
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let parse = |v: &Value| {
            v.to_phid_set()
                .ok_or_else(|| format!("edge value contains an invalid PHID: {}", v.display()))
        };
        match value {
            Value::List(_) => Ok(Self {
                set: Some(parse(value)?),
                ..Self::default()
            }),
            Value::Map(map) => {
                let mut spec = Self::default();
                for (op, phids) in map {
                    match op.as_str() {
                        "=" => spec.set = Some(parse(phids)?),
                        "+" => spec.add = parse(phids)?,
                        "-" => spec.remove = parse(phids)?,
                        other => return Err(format!("unknown edge operation \"{other}\"")),
                    }
                }
                Ok(spec)
            }
            other => Err(format!("edge value must be a list or map, got {}", other.display())),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        if let Some(set) = &self.set {
            map.insert("=".to_string(), Value::phids(set));
        }
        if !self.add.is_empty() {
            map.insert("+".to_string(), Value::phids(&self.add));
        }
        if !self.remove.is_empty() {
            map.insert("-".to_string(), Value::phids(&self.remove));
        }
        Value::Map(map)
    }

    pub fn apply(&self, current: &BTreeSet<Phid>) -> BTreeSet<Phid> {
        let mut result = self.set.clone().unwrap_or_else(|| current.clone());
        result.extend(self.add.iter().cloned());
        result.retain(|phid| !self.remove.contains(phid));
        result
    }

    /// Sequential composition: `a.then(b).apply(x) == b.apply(&a.apply(x))`.
    pub fn then(self, next: EdgeSpec) -> EdgeSpec {
        if next.set.is_some() {
            return next;
        }
        let set = self.set.map(|s| next.apply(&s));
        let add = self
            .add
            .difference(&next.remove)
            .chain(next.add.iter())
            .cloned()
            .collect();
        let remove = self
            .remove
            .difference(&next.add)
            .chain(next.remove.iter())
            .cloned()
            .collect();
        EdgeSpec { set, add, remove }
    }
}

/// Added/removed destinations between two edge states; disjoint by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDelta {
    pub added: BTreeSet<Phid>,
    pub removed: BTreeSet<Phid>,
}

impl EdgeDelta {
    pub fn between(old: &BTreeSet<Phid>, new: &BTreeSet<Phid>) -> Self {
        Self {
            added: new.difference(old).cloned().collect(),
            removed: old.difference(new).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// True when the only change is `actor` being added.
    pub fn is_only_adding(&self, actor: &Phid) -> bool {
        self.removed.is_empty() && self.added.len() == 1 && self.added.contains(actor)
    }

    /// True when the only change is `actor` being removed.
    pub fn is_only_removing(&self, actor: &Phid) -> bool {
        self.added.is_empty() && self.removed.len() == 1 && self.removed.contains(actor)
    }
}
