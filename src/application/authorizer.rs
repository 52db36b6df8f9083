use crate::domain::policy::{Actor, Capability, CapabilityCheck, Policy, PolicyObject};
use crate::domain::ports::Authorizer;

/// Evaluates object policies, automatic capabilities and extended policies.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyAuthorizer;

impl PolicyAuthorizer {
    pub fn new() -> Self {
        Self
    }

    fn passes(policy: &Policy, actor: &Actor, object: &dyn PolicyObject) -> bool {
        match policy {
            Policy::Public | Policy::Users => true,
            Policy::Admin => actor.is_admin(),
            Policy::NoOne => false,
            Policy::Members => object
                .policy_members()
                .is_some_and(|members| members.contains(actor.phid())),
            Policy::User(phid) => phid == actor.phid(),
        }
    }
}

impl CapabilityCheck for PolicyAuthorizer {
    fn has_capability(&self, actor: &Actor, object: &dyn PolicyObject, capability: Capability) -> bool {
        if actor.is_omnipotent() {
            return true;
        }
        let Some(policy) = object.policy(capability) else {
            return false;
        };
        let granted = Self::passes(&policy, actor, object)
            || object.has_automatic_capability(capability, actor, self);
        granted
            && object
                .extended_policy(capability)
                .into_iter()
                .all(|(other, required)| self.has_capability(actor, other, required))
    }
}

impl Authorizer for PolicyAuthorizer {}
