use super::attachment::Attachment;
use super::edge::EdgeType;
use super::effect::SearchDocument;
use super::object::{EditableObject, UniqueKey};
use super::phid::Phid;
use super::policy::{Actor, Capability, CapabilityCheck, Policy, PolicyObject};
use super::slug::normalize_project_slug;
use crate::error::AttachmentError;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const INDEX_NAME: &str = "project.name";
pub const INDEX_SLUG: &str = "project.slug";
pub const INDEX_MILESTONE: &str = "project.milestone";

pub const DEFAULT_ICON: &str = "fa-briefcase";
pub const DEFAULT_COLOR: &str = "blue";
pub const COLORS: [&str; 11] = [
    "red",
    "orange",
    "yellow",
    "green",
    "blue",
    "indigo",
    "violet",
    "pink",
    "grey",
    "checkered",
    "disabled",
];

const PATH_KEY_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Active,
    Archived,
}

impl ProjectStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ProjectStatus::Active),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub phid: Phid,
    pub author_phid: Phid,
    pub name: String,
    pub primary_slug: Option<String>,
    pub status: ProjectStatus,
    pub icon: String,
    pub color: String,
    pub image_phid: Option<Phid>,
    pub is_membership_locked: bool,
    pub parent_phid: Option<Phid>,
    pub milestone_number: Option<u32>,
    /// Concatenated path keys of every ancestor and this project.
    pub project_path: String,
    pub project_depth: u32,
    pub path_key: String,
    pub mail_key: String,
    pub view_policy: Policy,
    pub edit_policy: Policy,
    pub join_policy: Policy,
    #[serde(skip)]
    pub members: Attachment<BTreeSet<Phid>>,
    #[serde(skip)]
    pub watchers: Attachment<BTreeSet<Phid>>,
    /// Every hashtag the project owns, primary slug included.
    #[serde(skip)]
    pub slugs: Attachment<Vec<String>>,
    #[serde(skip)]
    pub parent: Attachment<Option<Box<Project>>>,
}

impl Project {
    /// A fresh, unsaved project with every relation loaded and empty.
    pub fn initialize(actor: &Actor, defaults: &ProjectDefaults) -> Self {
        Self {
            phid: Phid::generate(Self::PHID_TYPE),
            author_phid: actor.phid().clone(),
            name: String::new(),
            primary_slug: None,
            status: ProjectStatus::Active,
            icon: defaults.icon.clone(),
            color: defaults.color.clone(),
            image_phid: None,
            is_membership_locked: false,
            parent_phid: None,
            milestone_number: None,
            project_path: String::new(),
            project_depth: 0,
            path_key: String::new(),
            mail_key: String::new(),
            view_policy: defaults.view_policy.clone(),
            edit_policy: defaults.edit_policy.clone(),
            join_policy: defaults.join_policy.clone(),
            members: Attachment::Loaded(BTreeSet::new()),
            watchers: Attachment::Loaded(BTreeSet::new()),
            slugs: Attachment::Loaded(Vec::new()),
            parent: Attachment::Loaded(None),
        }
    }

    pub fn is_milestone(&self) -> bool {
        self.milestone_number.is_some()
    }

    pub fn is_member(&self, phid: &Phid) -> Result<bool, AttachmentError> {
        Ok(self.members.require("project members")?.contains(phid))
    }

    pub fn is_watcher(&self, phid: &Phid) -> Result<bool, AttachmentError> {
        Ok(self.watchers.require("project watchers")?.contains(phid))
    }

    /// Hashtags other than the primary slug.
    pub fn secondary_slugs(&self) -> Result<Vec<String>, AttachmentError> {
        let slugs = self.slugs.require("project slugs")?;
        Ok(slugs
            .iter()
            .filter(|slug| Some(*slug) != self.primary_slug.as_ref())
            .cloned()
            .collect())
    }

    pub fn parent_project(&self) -> Result<Option<&Project>, AttachmentError> {
        Ok(self.parent.require("parent project")?.as_deref())
    }

    fn parent_for_policy(&self) -> Option<&Project> {
        self.parent.get().and_then(|parent| parent.as_deref())
    }
}

/// Values a new project starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDefaults {
    pub icon: String,
    pub color: String,
    pub view_policy: Policy,
    pub edit_policy: Policy,
    pub join_policy: Policy,
}

impl Default for ProjectDefaults {
    fn default() -> Self {
        Self {
            icon: DEFAULT_ICON.to_string(),
            color: DEFAULT_COLOR.to_string(),
            view_policy: Policy::Users,
            edit_policy: Policy::Users,
            join_policy: Policy::Users,
        }
    }
}

impl PolicyObject for Project {
    fn policy_phid(&self) -> &Phid {
        &self.phid
    }

    fn policy(&self, capability: Capability) -> Option<Policy> {
        if self.is_milestone()
            && let Some(parent) = self.parent_for_policy()
        {
            return parent.policy(capability);
        }
        match capability {
            Capability::View => Some(self.view_policy.clone()),
            Capability::Edit => Some(self.edit_policy.clone()),
            Capability::Join => Some(self.join_policy.clone()),
            Capability::LockProjects => None,
        }
    }

    fn policy_members(&self) -> Option<&BTreeSet<Phid>> {
        if self.is_milestone()
            && let Some(parent) = self.parent_for_policy()
        {
            return parent.policy_members();
        }
        self.members.get()
    }

    fn has_automatic_capability(
        &self,
        capability: Capability,
        actor: &Actor,
        checker: &dyn CapabilityCheck,
    ) -> bool {
        match capability {
            Capability::View => self
                .policy_members()
                .is_some_and(|members| members.contains(actor.phid())),
            // Editors of a parent can always edit its subprojects.
            Capability::Edit => self
                .parent_for_policy()
                .is_some_and(|parent| checker.has_capability(actor, parent, Capability::Edit)),
            _ => false,
        }
    }

    fn extended_policy(&self, capability: Capability) -> Vec<(&dyn PolicyObject, Capability)> {
        match (capability, self.parent_for_policy()) {
            (Capability::View, Some(parent)) if !self.is_milestone() => {
                vec![(parent as &dyn PolicyObject, Capability::View)]
            }
            _ => Vec::new(),
        }
    }
}

impl EditableObject for Project {
    const KIND: &'static str = "project";
    const PHID_TYPE: &'static str = "PROJ";

    fn phid(&self) -> &Phid {
        &self.phid
    }

    fn author_phid(&self) -> &Phid {
        &self.author_phid
    }

    fn display_name(&self) -> String {
        match (self.name.is_empty(), self.milestone_number) {
            (true, Some(number)) => format!("Milestone {number}"),
            _ => self.name.clone(),
        }
    }

    fn set_policy(&mut self, capability: Capability, policy: Policy) -> bool {
        match capability {
            Capability::View => self.view_policy = policy,
            Capability::Edit => self.edit_policy = policy,
            Capability::Join => self.join_policy = policy,
            Capability::LockProjects => return false,
        }
        true
    }

    fn edges_changed(&mut self, edge_type: EdgeType, destinations: &BTreeSet<Phid>) {
        match edge_type {
            EdgeType::ProjectMember => self.members = Attachment::Loaded(destinations.clone()),
            EdgeType::ObjectWatcher => self.watchers = Attachment::Loaded(destinations.clone()),
            _ => {}
        }
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        let mut keys = Vec::new();
        if !self.name.is_empty() {
            keys.push(UniqueKey::new(INDEX_NAME, self.name.to_lowercase()));
        }
        if let (Some(parent), Some(number)) = (&self.parent_phid, self.milestone_number) {
            keys.push(UniqueKey::scoped(INDEX_MILESTONE, parent.as_str(), number));
        }
        keys
    }

    fn search_document(&self) -> SearchDocument {
        let slugs = self.slugs.get().cloned().unwrap_or_default();
        let name = self.display_name();
        let tokens = SearchDocument::tokenize(
            std::iter::once(name.as_str()).chain(slugs.iter().map(String::as_str)),
        );
        SearchDocument {
            phid: self.phid.clone(),
            kind: Self::KIND.to_string(),
            title: name,
            body: slugs
                .iter()
                .map(|slug| format!("#{slug}"))
                .collect::<Vec<_>>()
                .join(" "),
            tokens,
        }
    }

    fn prepare_persist(&mut self) -> Result<(), AttachmentError> {
        if self.path_key.is_empty() {
            self.path_key = random_string(PATH_KEY_LEN);
        }
        if self.mail_key.is_empty() {
            self.mail_key = random_string(20);
        }
        let (parent_path, parent_depth) = match self.parent_phid {
            Some(_) => {
                let parent = self
                    .parent_project()?
                    .ok_or(AttachmentError { what: "parent project" })?;
                (parent.project_path.clone(), Some(parent.project_depth))
            }
            None => (String::new(), None),
        };
        self.project_path = format!("{parent_path}{}", self.path_key);
        self.project_depth = parent_depth.map_or(0, |depth| depth + 1);
        self.primary_slug = (!self.name.is_empty())
            .then(|| normalize_project_slug(&self.name))
            .filter(|slug| !slug.is_empty());
        // Same order a reload yields: primary first, the rest sorted.
        if let Attachment::Loaded(slugs) = &mut self.slugs {
            let rest: BTreeSet<String> = slugs
                .drain(..)
                .filter(|slug| Some(slug) != self.primary_slug.as_ref())
                .collect();
            slugs.extend(self.primary_slug.iter().cloned());
            slugs.extend(rest);
        }
        Ok(())
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor::user(Phid::parse("PHID-USER-alice").unwrap())
    }

    #[test]
    fn test_initialize_uses_defaults() {
        let project = Project::initialize(&actor(), &ProjectDefaults::default());
        assert_eq!(project.icon, "fa-briefcase");
        assert_eq!(project.color, "blue");
        assert_eq!(project.phid.type_const(), "PROJ");
        assert!(project.members.is_loaded());
    }

    #[test]
    fn test_unloaded_members_error() {
        let mut project = Project::initialize(&actor(), &ProjectDefaults::default());
        project.members = Attachment::Unloaded;
        assert!(project.is_member(actor().phid()).is_err());
    }

    #[test]
    fn test_prepare_persist_builds_path_under_parent() {
        let mut parent = Project::initialize(&actor(), &ProjectDefaults::default());
        parent.name = "Parent".into();
        parent.prepare_persist().unwrap();
        assert_eq!(parent.project_depth, 0);
        assert_eq!(parent.project_path.len(), 4);
        assert_eq!(parent.primary_slug.as_deref(), Some("parent"));

        let mut child = Project::initialize(&actor(), &ProjectDefaults::default());
        child.parent_phid = Some(parent.phid.clone());
        child.parent = Attachment::Loaded(Some(Box::new(parent.clone())));
        child.prepare_persist().unwrap();
        assert_eq!(child.project_depth, 1);
        assert!(child.project_path.starts_with(&parent.project_path));
        assert_eq!(child.project_path.len(), 8);
    }

    #[test]
    fn test_milestone_keys_and_display_name() {
        let mut milestone = Project::initialize(&actor(), &ProjectDefaults::default());
        let parent = Phid::parse("PHID-PROJ-parent").unwrap();
        milestone.parent_phid = Some(parent);
        milestone.milestone_number = Some(3);
        assert_eq!(milestone.display_name(), "Milestone 3");
        assert_eq!(
            milestone.unique_keys(),
            vec![UniqueKey::new(INDEX_MILESTONE, "PHID-PROJ-parent/00000003")]
        );
    }
}
