use super::handlers::{
    ColorHandler, IconHandler, ImageHandler, LockedHandler, MembersHandler, MilestoneHandler,
    NameHandler, ParentHandler, SlugsHandler, StatusHandler, WatchersHandler,
};
use crate::application::handler::{
    CommentHandler, HandlerRegistry, PolicyHandler, SubscribersHandler,
};
use crate::application::profile::{EditorProfile, Recipients};
use crate::config::ProjectsConfig;
use crate::domain::attachment::Attachment;
use crate::domain::edge::EdgeType;
use crate::domain::effect::Effect;
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, ApplicationPolicy, Capability};
use crate::domain::ports::StoreRead;
use crate::domain::project::{INDEX_SLUG, Project};
use crate::domain::transaction::{Transaction, TransactionType};
use crate::error::{EditError, RegistryError, StorageError};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

const APPLICATION_PHID: &str = "PHID-APPS-projects";

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Project>, StorageError>> + Send + 'a>>;

/// Projects: named groups of users with hashtags, subprojects and milestones.
pub struct ProjectProfile {
    registry: HandlerRegistry<Project>,
    config: ProjectsConfig,
    application: ApplicationPolicy,
}

impl ProjectProfile {
    pub fn new(config: &ProjectsConfig) -> Result<Self, RegistryError> {
        let registry = HandlerRegistry::builder()
            .handler(NameHandler)
            .handler(SlugsHandler)
            .handler(StatusHandler)
            .handler(IconHandler)
            .handler(ColorHandler)
            .handler(ImageHandler)
            .handler(LockedHandler)
            .handler(ParentHandler::new(config.depth_limit))
            .handler(MilestoneHandler)
            .handler(MembersHandler::new())
            .handler(WatchersHandler::new())
            .handler(SubscribersHandler::new("subscribers"))
            .handler(CommentHandler::new("other"))
            .handler(PolicyHandler::new(Capability::View))
            .handler(PolicyHandler::new(Capability::Edit))
            .handler(PolicyHandler::new(Capability::Join))
            .build()?;
        let application = ApplicationPolicy {
            phid: Phid::parse(APPLICATION_PHID)
                .unwrap_or_else(|_| Phid::generate("APPS")),
            lock_projects: config.lock_policy.clone(),
        };
        Ok(Self {
            registry,
            config: config.clone(),
            application,
        })
    }
}

/// Loads a project with members, watchers, hashtags and its ancestor chain
/// attached.
pub fn load_project<'a>(reader: &'a dyn StoreRead, phid: &'a Phid, depth: u32) -> LoadFuture<'a> {
    Box::pin(async move {
        let Some(record) = reader.object(phid).await? else {
            return Ok(None);
        };
        if record.kind != Project::KIND {
            return Ok(None);
        }
        let mut project: Project = record.decode()?;
        project.members = Attachment::Loaded(
            reader
                .edge_destinations(phid, EdgeType::ProjectMember)
                .await?,
        );
        project.watchers = Attachment::Loaded(
            reader
                .edge_destinations(phid, EdgeType::ObjectWatcher)
                .await?,
        );
        let mut slugs = reader.keys_owned(INDEX_SLUG, phid).await?;
        if let Some(primary) = &project.primary_slug
            && let Some(at) = slugs.iter().position(|slug| slug == primary)
        {
            let primary = slugs.remove(at);
            slugs.insert(0, primary);
        }
        project.slugs = Attachment::Loaded(slugs);
        project.parent = match &project.parent_phid {
            Some(parent) if depth < 64 => Attachment::Loaded(
                load_project(reader, parent, depth + 1)
                    .await?
                    .map(Box::new),
            ),
            Some(_) => Attachment::Unloaded,
            None => Attachment::Loaded(None),
        };
        Ok(Some(project))
    })
}

#[async_trait]
impl EditorProfile<Project> for ProjectProfile {
    fn registry(&self) -> &HandlerRegistry<Project> {
        &self.registry
    }

    fn initialize(&self, actor: &Actor) -> Project {
        Project::initialize(actor, &self.config.defaults)
    }

    async fn load(&self, reader: &dyn StoreRead, phid: &Phid) -> Result<Option<Project>, EditError> {
        Ok(load_project(reader, phid, 0).await?)
    }

    fn application_policy(&self) -> &ApplicationPolicy {
        &self.application
    }

    async fn prepare_persist(&self, reader: &dyn StoreRead, object: &mut Project) -> Result<(), EditError> {
        if let Some(parent_phid) = object.parent_phid.clone()
            && !object.parent.is_loaded()
        {
            let parent = load_project(reader, &parent_phid, 1).await?.ok_or_else(|| {
                EditError::InvalidTransaction(format!("parent project {parent_phid} does not exist"))
            })?;
            object.parent = Attachment::Loaded(Some(Box::new(parent)));
        }
        object.prepare_persist()?;
        Ok(())
    }

    fn mail_prefix(&self) -> &'static str {
        "[Project]"
    }

    fn object_uri(&self, object: &Project) -> String {
        format!("project/view/{}/", object.phid)
    }

    async fn mail_recipients(
        &self,
        reader: &dyn StoreRead,
        object: &Project,
        _actor: &Actor,
    ) -> Result<Recipients, StorageError> {
        let to = reader
            .edge_destinations(&object.phid, EdgeType::ProjectMember)
            .await?;
        let cc = reader
            .edge_destinations(&object.phid, EdgeType::ObjectSubscriber)
            .await?;
        Ok(Recipients { to, cc })
    }

    fn extra_effects(&self, object: &Project, xactions: &[Transaction]) -> Vec<Effect> {
        let structural = xactions.iter().any(|xaction| {
            matches!(
                &xaction.r#type,
                TransactionType::Edge(EdgeType::ProjectMember)
            ) || matches!(
                &xaction.r#type,
                TransactionType::Custom(tag) if tag == super::handlers::PARENT || tag == super::handlers::MILESTONE
            )
        });
        if structural {
            vec![Effect::RematerializeMembership {
                project: object.phid.clone(),
            }]
        } else {
            Vec::new()
        }
    }
}
