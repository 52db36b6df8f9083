use super::handlers::{BodyHandler, TitleHandler, VisibilityHandler};
use crate::application::handler::{
    CommentHandler, HandlerRegistry, PolicyHandler, SubscribersHandler,
};
use crate::application::profile::{EditorProfile, Recipients};
use crate::domain::attachment::Attachment;
use crate::domain::edge::EdgeType;
use crate::domain::object::EditableObject;
use crate::domain::phid::Phid;
use crate::domain::policy::{Actor, ApplicationPolicy, Capability, Policy};
use crate::domain::ports::StoreRead;
use crate::domain::post::Post;
use crate::domain::transaction::Transaction;
use crate::error::{EditError, RegistryError, StorageError};
use async_trait::async_trait;

const APPLICATION_PHID: &str = "PHID-APPS-phame";

/// Blog posts. Drafts stay quiet: no mail and no feed until published.
pub struct PostProfile {
    registry: HandlerRegistry<Post>,
    application: ApplicationPolicy,
}

impl PostProfile {
    pub fn new() -> Result<Self, RegistryError> {
        let registry = HandlerRegistry::builder()
            .handler(TitleHandler)
            .handler(BodyHandler)
            .handler(VisibilityHandler)
            .handler(SubscribersHandler::new("subscribers"))
            .handler(CommentHandler::new("comment"))
            .handler(PolicyHandler::new(Capability::View))
            .handler(PolicyHandler::new(Capability::Edit))
            .build()?;
        Ok(Self {
            registry,
            application: ApplicationPolicy {
                phid: Phid::parse(APPLICATION_PHID).unwrap_or_else(|_| Phid::generate("APPS")),
                lock_projects: Policy::NoOne,
            },
        })
    }
}

#[async_trait]
impl EditorProfile<Post> for PostProfile {
    fn registry(&self) -> &HandlerRegistry<Post> {
        &self.registry
    }

    fn initialize(&self, actor: &Actor) -> Post {
        Post::initialize(actor)
    }

    async fn load(&self, reader: &dyn StoreRead, phid: &Phid) -> Result<Option<Post>, EditError> {
        let Some(record) = reader.object(phid).await? else {
            return Ok(None);
        };
        if record.kind != Post::KIND {
            return Ok(None);
        }
        let mut post: Post = record.decode()?;
        post.subscribers = Attachment::Loaded(
            reader
                .edge_destinations(phid, EdgeType::ObjectSubscriber)
                .await?,
        );
        Ok(Some(post))
    }

    fn application_policy(&self) -> &ApplicationPolicy {
        &self.application
    }

    fn mail_prefix(&self) -> &'static str {
        "[Phame]"
    }

    fn object_uri(&self, object: &Post) -> String {
        format!("phame/post/view/{}/", object.phid)
    }

    fn should_send_mail(&self, object: &Post, _xactions: &[Transaction]) -> bool {
        !object.is_draft()
    }

    fn should_publish_feed(&self, object: &Post, _xactions: &[Transaction]) -> bool {
        !object.is_draft()
    }

    async fn mail_recipients(
        &self,
        reader: &dyn StoreRead,
        object: &Post,
        actor: &Actor,
    ) -> Result<Recipients, StorageError> {
        let to = [object.blogger_phid.clone(), actor.phid().clone()]
            .into_iter()
            .collect();
        let cc = reader
            .edge_destinations(&object.phid, EdgeType::ObjectSubscriber)
            .await?;
        Ok(Recipients { to, cc })
    }
}
