//! Access policy for the privileged reset.

use std::collections::HashSet;

/// Gate for `!reset`. Membership is a set so more admins can be allowed
/// later without touching callers; today one identity is configured and it
/// is also the identity named in the help text.
#[derive(Debug, Clone)]
pub struct ResetPolicy {
    admins: HashSet<String>,
    primary: String,
}

impl ResetPolicy {
    pub fn single(identity: impl Into<String>) -> Self {
        let primary = identity.into();
        let mut admins = HashSet::new();
        admins.insert(primary.clone());
        Self { admins, primary }
    }

    pub fn allow(mut self, identity: impl Into<String>) -> Self {
        self.admins.insert(identity.into());
        self
    }

    pub fn can_reset(&self, sender_id: &str) -> bool {
        self.admins.contains(sender_id)
    }

    /// Chat mention of the primary admin, rendered into help text. Same
    /// configured value the access check uses.
    pub fn admin_mention(&self) -> String {
        format!("<@{}>", self.primary)
    }
}
