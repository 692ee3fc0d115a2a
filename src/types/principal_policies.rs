//! Listing of the policies whose principal scope covers a principal.

use itertools::Itertools;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::ast::{ActionConstraint, Policy};

use super::EntityUid;

/// The concrete policies that could apply to one principal, with their
/// store ids. Produced by `PolicySet::policies_for_principal`.
#[derive(Debug, Clone)]
pub struct PrincipalPolicies {
    principal: EntityUid,
    policies: Vec<(String, Policy)>,
}

impl PrincipalPolicies {
    pub(crate) fn new(principal: EntityUid, policies: Vec<(String, Policy)>) -> Self {
        PrincipalPolicies {
            principal,
            policies,
        }
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// The matching policies, in store order.
    pub fn policies(&self) -> impl Iterator<Item = (&str, &Policy)> {
        self.policies.iter().map(|(id, p)| (id.as_str(), p))
    }

    /// Sorted ids of the matching policies.
    pub fn ids(&self) -> Vec<String> {
        self.policies.iter().map(|(id, _)| id.clone()).sorted().collect()
    }

    /// Sorted action UIDs named by the matching policies' scopes.
    ///
    /// An unconstrained action scope contributes nothing.
    pub fn actions_by_name(&self) -> Vec<String> {
        self.policies
            .iter()
            .flat_map(|(_, p)| match &p.action {
                ActionConstraint::Eq(uid) => vec![uid.to_string()],
                ActionConstraint::In(uids) => uids.iter().map(|u| u.to_string()).collect(),
                ActionConstraint::Any => Vec::new(),
            })
            .sorted()
            .dedup()
            .collect()
    }
}

impl Serialize for PrincipalPolicies {
    fn serialize<S>(&self, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Entry<'a> {
            id: &'a str,
            policy: &'a Policy,
        }

        let entries: Vec<Entry<'_>> = self
            .policies
            .iter()
            .map(|(id, policy)| Entry { id, policy })
            .collect();

        let mut s = ser.serialize_struct("PrincipalPolicies", 2)?;
        s.serialize_field("principal", &self.principal)?;
        s.serialize_field("policies", &entries)?;
        s.end()
    }
}
