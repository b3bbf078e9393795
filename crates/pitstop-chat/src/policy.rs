//! Thread access policy, centralized so no call site branches on roles
//! by hand.
//!
//! | role          | own thread | other thread |
//! |---------------|------------|--------------|
//! | customer      | read+write | denied       |
//! | staff / admin | read+write | read+write   |
//!
//! Unauthenticated callers never reach these checks: without a resolved
//! `Identity` there is nothing to pass in.

use pitstop_types::error::ChatError;
use pitstop_types::models::{Identity, Role, ThreadId};

pub fn can_read(identity: &Identity, thread_id: ThreadId) -> bool {
    identity.role.is_staff() || identity.id == thread_id.0
}

pub fn can_write(identity: &Identity, thread_id: ThreadId) -> bool {
    // Read and write currently coincide; kept separate because the
    // policy table treats them as distinct questions.
    can_read(identity, thread_id)
}

pub fn authorize_read(identity: &Identity, thread_id: ThreadId) -> Result<(), ChatError> {
    if can_read(identity, thread_id) {
        Ok(())
    } else {
        Err(denied(identity, thread_id))
    }
}

pub fn authorize_write(identity: &Identity, thread_id: ThreadId) -> Result<(), ChatError> {
    if can_write(identity, thread_id) {
        Ok(())
    } else {
        Err(denied(identity, thread_id))
    }
}

/// Roster access is staff/admin only.
pub fn authorize_roster(identity: &Identity) -> Result<(), ChatError> {
    if identity.role.is_staff() {
        Ok(())
    } else {
        Err(ChatError::Authorization(format!(
            "role {} may not view the roster",
            identity.role
        )))
    }
}

fn denied(identity: &Identity, thread_id: ThreadId) -> ChatError {
    ChatError::Authorization(format!(
        "role {} may not access thread {}",
        identity.role, thread_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn who(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            display_name: "test".into(),
            email: String::new(),
            role,
        }
    }

    #[test]
    fn customer_is_confined_to_own_thread() {
        let customer = who(Role::Customer);
        let own = customer.own_thread();
        let other = ThreadId(Uuid::new_v4());

        assert!(can_read(&customer, own));
        assert!(can_write(&customer, own));
        assert!(!can_read(&customer, other));
        assert!(!can_write(&customer, other));
    }

    #[test]
    fn two_customers_cannot_touch_each_other() {
        let a = who(Role::Customer);
        let b = who(Role::Customer);
        assert!(!can_write(&a, b.own_thread()));
        assert!(!can_write(&b, a.own_thread()));
    }

    #[test]
    fn staff_and_admin_reach_any_thread() {
        let any = ThreadId(Uuid::new_v4());
        for role in [Role::Staff, Role::Admin] {
            let actor = who(role);
            assert!(can_read(&actor, any));
            assert!(can_write(&actor, any));
            assert!(authorize_roster(&actor).is_ok());
        }
    }

    #[test]
    fn customer_is_denied_the_roster() {
        let customer = who(Role::Customer);
        assert!(matches!(
            authorize_roster(&customer),
            Err(ChatError::Authorization(_))
        ));
    }
}
