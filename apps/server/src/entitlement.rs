//! Entitlement gate backed by the server configuration.

use std::collections::HashSet;

use async_trait::async_trait;
use chainforge_core::group_goals::EntitlementGateTrait;
use chainforge_core::Result;

/// Grants group goal access to a configured set of users, or to everyone
/// when no set is configured.
pub struct ConfiguredEntitlementGate {
    allowed: Option<HashSet<String>>,
}

impl ConfiguredEntitlementGate {
    pub fn new(allowed: Option<HashSet<String>>) -> Self {
        Self { allowed }
    }
}

#[async_trait]
impl EntitlementGateTrait for ConfiguredEntitlementGate {
    async fn is_entitled(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .allowed
            .as_ref()
            .map_or(true, |users| users.contains(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_gate_admits_everyone() {
        let gate = ConfiguredEntitlementGate::new(None);
        assert!(gate.is_entitled("anyone").await.unwrap());
    }

    #[tokio::test]
    async fn allow_list_admits_only_listed_users() {
        let gate = ConfiguredEntitlementGate::new(Some(HashSet::from(["alice".to_string()])));
        assert!(gate.is_entitled("alice").await.unwrap());
        assert!(!gate.is_entitled("bob").await.unwrap());
    }
}
