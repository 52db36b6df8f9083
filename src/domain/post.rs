use super::attachment::Attachment;
use super::edge::EdgeType;
use super::effect::SearchDocument;
use super::object::EditableObject;
use super::phid::Phid;
use super::policy::{Actor, Capability, CapabilityCheck, Policy, PolicyObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostVisibility {
    #[default]
    Draft,
    Published,
}

impl PostVisibility {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PostVisibility::Draft),
            "published" => Some(PostVisibility::Published),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PostVisibility::Draft => "draft",
            PostVisibility::Published => "published",
        }
    }
}

/// A blog post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub phid: Phid,
    pub blogger_phid: Phid,
    pub title: String,
    pub body: String,
    pub visibility: PostVisibility,
    pub date_published: Option<u64>,
    pub view_policy: Policy,
    pub edit_policy: Policy,
    #[serde(skip)]
    pub subscribers: Attachment<BTreeSet<Phid>>,
}

impl Post {
    pub fn initialize(actor: &Actor) -> Self {
        Self {
            phid: Phid::generate(Self::PHID_TYPE),
            blogger_phid: actor.phid().clone(),
            title: String::new(),
            body: String::new(),
            visibility: PostVisibility::Draft,
            date_published: None,
            view_policy: Policy::Users,
            edit_policy: Policy::User(actor.phid().clone()),
            subscribers: Attachment::Loaded(BTreeSet::new()),
        }
    }

    pub fn is_draft(&self) -> bool {
        self.visibility == PostVisibility::Draft
    }
}

impl PolicyObject for Post {
    fn policy_phid(&self) -> &Phid {
        &self.phid
    }

    fn policy(&self, capability: Capability) -> Option<Policy> {
        match capability {
            Capability::View => Some(self.view_policy.clone()),
            Capability::Edit => Some(self.edit_policy.clone()),
            _ => None,
        }
    }

    fn has_automatic_capability(
        &self,
        capability: Capability,
        actor: &Actor,
        _checker: &dyn CapabilityCheck,
    ) -> bool {
        matches!(capability, Capability::View | Capability::Edit)
            && actor.phid() == &self.blogger_phid
    }
}

impl EditableObject for Post {
    const KIND: &'static str = "post";
    const PHID_TYPE: &'static str = "POST";

    fn phid(&self) -> &Phid {
        &self.phid
    }

    fn author_phid(&self) -> &Phid {
        &self.blogger_phid
    }

    fn display_name(&self) -> String {
        self.title.clone()
    }

    fn set_policy(&mut self, capability: Capability, policy: Policy) -> bool {
        match capability {
            Capability::View => self.view_policy = policy,
            Capability::Edit => self.edit_policy = policy,
            _ => return false,
        }
        true
    }

    fn edges_changed(&mut self, edge_type: EdgeType, destinations: &BTreeSet<Phid>) {
        if edge_type == EdgeType::ObjectSubscriber {
            self.subscribers = Attachment::Loaded(destinations.clone());
        }
    }

    fn search_document(&self) -> SearchDocument {
        SearchDocument {
            phid: self.phid.clone(),
            kind: Self::KIND.to_string(),
            title: self.title.clone(),
            body: self.body.clone(),
            tokens: SearchDocument::tokenize([self.title.as_str()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blogger_can_always_edit() {
        struct Deny;
        impl CapabilityCheck for Deny {
            fn has_capability(&self, _: &Actor, _: &dyn PolicyObject, _: Capability) -> bool {
                false
            }
        }
        let blogger = Actor::user(Phid::parse("PHID-USER-blogger").unwrap());
        let other = Actor::user(Phid::parse("PHID-USER-other").unwrap());
        let post = Post::initialize(&blogger);
        assert!(post.has_automatic_capability(Capability::Edit, &blogger, &Deny));
        assert!(!post.has_automatic_capability(Capability::Edit, &other, &Deny));
        assert!(post.policy(Capability::Join).is_none());
    }
}
