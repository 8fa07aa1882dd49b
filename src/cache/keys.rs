use std::fmt;

use crate::domain::policy::PolicyId;

/// Identifies one generated view: the policy it was generated under and the
/// post it shows. Views are never shared across policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub policy: PolicyId,
    pub post_id: u32,
}

impl ViewKey {
    pub fn new(policy: PolicyId, post_id: u32) -> Self {
        Self { policy, post_id }
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.policy.label(), self.post_id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn same_post_under_different_policies_are_distinct_keys() {
        let keys: HashSet<ViewKey> = PolicyId::ALL
            .into_iter()
            .map(|policy| ViewKey::new(policy, 1))
            .collect();
        assert_eq!(keys.len(), 6);
        assert_eq!(ViewKey::new(PolicyId::ControlFlow, 42).to_string(), "v4:42");
    }
}
