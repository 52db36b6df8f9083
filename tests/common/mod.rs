#![allow(dead_code)]

use apptx::application::authorizer::PolicyAuthorizer;
use apptx::application::dispatcher::EffectDispatcher;
use apptx::application::editor::TransactionEditor;
use apptx::application::post::profile::PostProfile;
use apptx::application::project::membership::MembershipIndexer;
use apptx::application::project::profile::ProjectProfile;
use apptx::config::ProjectsConfig;
use apptx::domain::edge::{EdgeSpec, EdgeType};
use apptx::domain::phid::Phid;
use apptx::domain::policy::Actor;
use apptx::domain::ports::{StoreHandle, StoreRead};
use apptx::domain::post::Post;
use apptx::domain::project::Project;
use apptx::domain::transaction::{ContentSource, TransactionDraft, TransactionType};
use apptx::domain::value::Value;
use apptx::infrastructure::in_memory::InMemoryStore;
use apptx::infrastructure::sinks::{InMemorySearchIndex, RecordingFeedSink, RecordingMailSink};
use std::collections::BTreeSet;
use std::sync::Arc;

pub fn phid(name: &str) -> Phid {
    Phid::parse(&format!("PHID-USER-{name}")).unwrap()
}

pub fn user(name: &str) -> Actor {
    Actor::user(phid(name))
}

pub fn admin(name: &str) -> Actor {
    Actor::admin(phid(name))
}

pub fn draft(tag: &str, value: impl Into<Value>) -> TransactionDraft {
    TransactionDraft::new(TransactionType::parse(tag).unwrap(), value)
}

pub fn add_members(members: &[&str]) -> TransactionDraft {
    TransactionDraft::edge(
        EdgeType::ProjectMember,
        EdgeSpec::adding(members.iter().map(|name| phid(name))),
    )
}

pub fn remove_members(members: &[&str]) -> TransactionDraft {
    TransactionDraft::edge(
        EdgeType::ProjectMember,
        EdgeSpec::removing(members.iter().map(|name| phid(name))),
    )
}

pub struct Harness {
    pub store: StoreHandle,
    pub projects: Arc<ProjectProfile>,
    pub posts: Arc<PostProfile>,
    pub mail: RecordingMailSink,
    pub feed: RecordingFeedSink,
    pub search: InMemorySearchIndex,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_projects_config(ProjectsConfig::default())
    }

    pub fn with_projects_config(config: ProjectsConfig) -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            projects: Arc::new(ProjectProfile::new(&config).unwrap()),
            posts: Arc::new(PostProfile::new().unwrap()),
            mail: RecordingMailSink::new(),
            feed: RecordingFeedSink::new(),
            search: InMemorySearchIndex::new(),
        }
    }

    pub fn project_editor(&self, actor: &Actor) -> TransactionEditor<Project> {
        TransactionEditor::new(
            self.store.clone(),
            Arc::new(PolicyAuthorizer),
            self.projects.clone(),
            actor.clone(),
            ContentSource::Console,
        )
    }

    pub fn post_editor(&self, actor: &Actor) -> TransactionEditor<Post> {
        TransactionEditor::new(
            self.store.clone(),
            Arc::new(PolicyAuthorizer),
            self.posts.clone(),
            actor.clone(),
            ContentSource::Console,
        )
    }

    pub fn dispatcher(&self) -> EffectDispatcher {
        EffectDispatcher::new(
            Arc::new(self.mail.clone()),
            Arc::new(self.feed.clone()),
            Arc::new(self.search.clone()),
            Arc::new(MembershipIndexer::new(self.store.clone())),
        )
    }

    /// Creates a project and dispatches its effects.
    pub async fn create_project(
        &self,
        actor: &Actor,
        drafts: Vec<TransactionDraft>,
    ) -> Project {
        let editor = self.project_editor(actor);
        let outcome = editor
            .apply_transactions(editor.initialize(), drafts)
            .await
            .unwrap();
        self.dispatcher().dispatch(&outcome.effects).await;
        outcome.object
    }

    pub async fn named_project(&self, actor: &Actor, name: &str) -> Project {
        self.create_project(actor, vec![draft("project.name", name)])
            .await
    }

    /// Applies drafts to a stored project and dispatches effects.
    pub async fn edit_project(
        &self,
        actor: &Actor,
        project: &Phid,
        drafts: Vec<TransactionDraft>,
    ) -> apptx::error::Result<apptx::application::editor::EditOutcome<Project>> {
        let editor = self.project_editor(actor);
        let object = editor.load(project).await?.expect("project exists");
        let outcome = editor.apply_transactions(object, drafts).await?;
        self.dispatcher().dispatch(&outcome.effects).await;
        Ok(outcome)
    }

    /// Edge destinations as committed.
    pub async fn edges(&self, src: &Phid, edge_type: EdgeType) -> BTreeSet<Phid> {
        self.store.edge_destinations(src, edge_type).await.unwrap()
    }

    pub async fn load_project(&self, project: &Phid) -> Project {
        self.project_editor(&Actor::omnipotent())
            .load(project)
            .await
            .unwrap()
            .expect("project exists")
    }
}
