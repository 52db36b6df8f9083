use super::phid::Phid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    View,
    Edit,
    Join,
    /// Application-level permission to lock or unlock project membership.
    LockProjects,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::View => "view",
            Capability::Edit => "edit",
            Capability::Join => "join",
            Capability::LockProjects => "lock-projects",
        };
        f.write_str(name)
    }
}

/// Access-control expression attached to an object for one capability.
///
/// Serialized as a plain string: one of the well-known names or a user PHID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Policy {
    Public,
    Users,
    Admin,
    NoOne,
    /// Members of the object the policy is attached to.
    Members,
    User(Phid),
}

impl Policy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Policy::Public),
            "users" => Some(Policy::Users),
            "admin" => Some(Policy::Admin),
            "no-one" => Some(Policy::NoOne),
            "members" => Some(Policy::Members),
            other => Phid::parse(other).ok().map(Policy::User),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Policy::Public => "public".to_string(),
            Policy::Users => "users".to_string(),
            Policy::Admin => "admin".to_string(),
            Policy::NoOne => "no-one".to_string(),
            Policy::Members => "members".to_string(),
            Policy::User(phid) => phid.to_string(),
        }
    }

    /// Human label used when rendering policy changes.
    pub fn label(&self) -> String {
        match self {
            Policy::Public => "Public (No Login Required)".to_string(),
            Policy::Users => "All Users".to_string(),
            Policy::Admin => "Administrators".to_string(),
            Policy::NoOne => "No One".to_string(),
            Policy::Members => "Members".to_string(),
            Policy::User(phid) => phid.to_string(),
        }
    }
}

impl TryFrom<String> for Policy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Policy::parse(&value).ok_or_else(|| format!("unknown policy \"{value}\""))
    }
}

impl From<Policy> for String {
    fn from(policy: Policy) -> Self {
        policy.as_string()
    }
}

/// The identity an edit is performed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    phid: Phid,
    is_admin: bool,
    is_omnipotent: bool,
}

impl Actor {
    pub fn user(phid: Phid) -> Self {
        Self {
            phid,
            is_admin: false,
            is_omnipotent: false,
        }
    }

    pub fn admin(phid: Phid) -> Self {
        Self {
            phid,
            is_admin: true,
            is_omnipotent: false,
        }
    }

    /// System actor used by daemons and maintenance tools; passes every check.
    pub fn omnipotent() -> Self {
        Self {
            phid: Phid::parse("PHID-APPS-system").unwrap_or_else(|_| Phid::generate("APPS")),
            is_admin: true,
            is_omnipotent: true,
        }
    }

    pub fn phid(&self) -> &Phid {
        &self.phid
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_omnipotent(&self) -> bool {
        self.is_omnipotent
    }
}

/// Anything capabilities can be checked against.
pub trait PolicyObject: Send + Sync {
    fn policy_phid(&self) -> &Phid;

    /// The policy governing `capability`, or `None` if the object does not
    /// support that capability.
    fn policy(&self, capability: Capability) -> Option<Policy>;

    /// Member set evaluated by [`Policy::Members`]; `None` when the object
    /// has no notion of membership or members were not loaded.
    fn policy_members(&self) -> Option<&BTreeSet<Phid>> {
        None
    }

    /// Capabilities granted regardless of policy (e.g. members can always view).
    fn has_automatic_capability(
        &self,
        _capability: Capability,
        _actor: &Actor,
        _checker: &dyn CapabilityCheck,
    ) -> bool {
        false
    }

    /// Additional checks that must also pass (e.g. viewing a subproject
    /// requires viewing its parent).
    fn extended_policy(&self, _capability: Capability) -> Vec<(&dyn PolicyObject, Capability)> {
        Vec::new()
    }
}

/// Read-only capability test, handed to objects so automatic capabilities
/// can recurse (e.g. "editors of the parent can edit the child").
pub trait CapabilityCheck: Send + Sync {
    fn has_capability(&self, actor: &Actor, object: &dyn PolicyObject, capability: Capability)
    -> bool;
}

/// Application-wide policies that are not attached to any single object.
#[derive(Debug, Clone)]
pub struct ApplicationPolicy {
    pub phid: Phid,
    pub lock_projects: Policy,
}

impl PolicyObject for ApplicationPolicy {
    fn policy_phid(&self) -> &Phid {
        &self.phid
    }

    fn policy(&self, capability: Capability) -> Option<Policy> {
        match capability {
            Capability::LockProjects => Some(self.lock_projects.clone()),
            Capability::View => Some(Policy::Users),
            Capability::Edit | Capability::Join => Some(Policy::Admin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_string_round_trip() {
        for raw in ["public", "users", "admin", "no-one", "members", "PHID-USER-bob"] {
            let policy = Policy::parse(raw).unwrap();
            assert_eq!(policy.as_string(), raw);
        }
        assert!(Policy::parse("everyone").is_none());
    }

    #[test]
    fn test_policy_deserialize_rejects_unknown() {
        let err = serde_json::from_str::<Policy>("\"bogus\"");
        assert!(err.is_err());
        let ok: Policy = serde_json::from_str("\"no-one\"").unwrap();
        assert_eq!(ok, Policy::NoOne);
    }
}
