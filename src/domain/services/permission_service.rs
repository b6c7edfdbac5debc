use crate::domain::entities::{Conversation, ConversationStatus, SessionContext};

/// Decides what a caller may see and do in a conversation based on its
/// assignment and the caller's role.
pub struct PermissionService;

impl PermissionService {
    /// Administrators see everything. Everyone else sees unassigned
    /// conversations and the ones assigned to them; a conversation owned by
    /// another staff member is hidden, not just read-only.
    pub fn can_view(conversation: &Conversation, caller: &SessionContext) -> bool {
        if caller.is_admin() {
            return true;
        }
        match conversation.assignee_id() {
            None => true,
            Some(assignee) => assignee == caller.user_id,
        }
    }

    /// Send eligibility. `None` means no conversation is selected.
    pub fn can_send(conversation: Option<&Conversation>, caller: &SessionContext) -> bool {
        let Some(conversation) = conversation else {
            return false;
        };
        if conversation.is_closed() {
            return false;
        }
        match conversation.assignee_id() {
            // Patients cannot open an unassigned thread through this path
            None => caller.is_staff(),
            Some(assignee) => assignee == caller.user_id,
        }
    }

    /// Only staff can take a pending, unassigned conversation
    pub fn can_accept(conversation: &Conversation, caller: &SessionContext) -> bool {
        caller.is_staff()
            && conversation.status == ConversationStatus::Pending
            && !conversation.is_assigned()
    }

    /// The assignee or an administrator may close an active conversation
    pub fn can_close(conversation: &Conversation, caller: &SessionContext) -> bool {
        conversation.status == ConversationStatus::Active
            && (caller.is_admin() || conversation.is_assigned_to(&caller.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Role, UserRef, UserSummary};

    fn conversation(status: ConversationStatus, assignee: Option<UserRef>) -> Conversation {
        let mut conv = Conversation::pending("c1", Some(UserRef::Id("p1".to_string())));
        conv.status = status;
        conv.assigned_to = assignee;
        conv
    }

    fn embedded(id: &str) -> Option<UserRef> {
        Some(UserRef::Summary(UserSummary {
            id: id.to_string(),
            name: Some("Staff".to_string()),
            email: None,
            role: Some(Role::Consultant),
        }))
    }

    #[test]
    fn test_admin_views_everything() {
        let admin = SessionContext::new("a1", Role::Admin);
        let conv = conversation(ConversationStatus::Active, embedded("s1"));
        assert!(PermissionService::can_view(&conv, &admin));
    }

    #[test]
    fn test_other_assignee_hides_conversation() {
        let s2 = SessionContext::new("s2", Role::Consultant);
        let conv = conversation(ConversationStatus::Active, Some(UserRef::Id("s1".to_string())));
        assert!(!PermissionService::can_view(&conv, &s2));
        assert!(!PermissionService::can_send(Some(&conv), &s2));
    }

    #[test]
    fn test_assignee_can_send_with_embedded_reference() {
        let s1 = SessionContext::new("s1", Role::Consultant);
        let conv = conversation(ConversationStatus::Active, embedded("s1"));
        assert!(PermissionService::can_view(&conv, &s1));
        assert!(PermissionService::can_send(Some(&conv), &s1));
    }

    #[test]
    fn test_unassigned_send_is_staff_only() {
        let conv = conversation(ConversationStatus::Pending, None);
        let patient = SessionContext::new("p1", Role::Patient);
        let consultant = SessionContext::new("s1", Role::Consultant);
        assert!(!PermissionService::can_send(Some(&conv), &patient));
        assert!(PermissionService::can_send(Some(&conv), &consultant));
    }

    #[test]
    fn test_closed_or_missing_never_sends() {
        let admin = SessionContext::new("a1", Role::Admin);
        let conv = conversation(ConversationStatus::Closed, embedded("a1"));
        assert!(!PermissionService::can_send(Some(&conv), &admin));
        assert!(!PermissionService::can_send(None, &admin));
    }

    #[test]
    fn test_accept_and_close_rules() {
        let s1 = SessionContext::new("s1", Role::Consultant);
        let s2 = SessionContext::new("s2", Role::Consultant);
        let admin = SessionContext::new("a1", Role::Admin);

        let pending = conversation(ConversationStatus::Pending, None);
        assert!(PermissionService::can_accept(&pending, &s1));
        assert!(!PermissionService::can_accept(
            &pending,
            &SessionContext::new("p1", Role::Patient)
        ));

        let active = conversation(ConversationStatus::Active, embedded("s1"));
        assert!(!PermissionService::can_accept(&active, &s2));
        assert!(PermissionService::can_close(&active, &s1));
        assert!(PermissionService::can_close(&active, &admin));
        assert!(!PermissionService::can_close(&active, &s2));
    }
}
