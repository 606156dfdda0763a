use passflow_core::{Policy, PolicyError, PolicyRequest, PolicyResult};

/// Pasa si el usuario de la request pertenece al grupo.
#[derive(Debug, Clone)]
pub struct GroupMembershipPolicy {
    name: String,
    group: String,
}

impl GroupMembershipPolicy {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self { name: name.into(),
               group: group.into() }
    }
}

impl Policy for GroupMembershipPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn passes(&self, request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
        let member = request.user.is_some_and(|u| u.groups.iter().any(|g| g == &self.group));
        Ok(if member {
               PolicyResult::pass()
           } else {
               PolicyResult::fail(format!("User is not a member of '{}'.", self.group))
           })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passflow_core::{ContextStore, User};

    #[test]
    fn membership() {
        let ctx = ContextStore::new();
        let mut admin = User::new("root", "root@example.com");
        admin.groups.push("admins".into());
        let guest = User::new("guest", "guest@example.com");
        let policy = GroupMembershipPolicy::new("admins-only", "admins");

        assert!(policy.passes(&PolicyRequest::new(&ctx).with_user(Some(&admin))).expect("eval").passing);
        assert!(!policy.passes(&PolicyRequest::new(&ctx).with_user(Some(&guest))).expect("eval").passing);
        assert!(!policy.passes(&PolicyRequest::new(&ctx)).expect("eval").passing);
    }
}
