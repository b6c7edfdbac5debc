use crate::domain::entities::conversation::ConversationStatus;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ConversationStatus,
        to: ConversationStatus,
    },
}

/// Lifecycle actions staff can take on a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    Accept,
    Close,
}

impl ConversationAction {
    /// Status the action leads to
    pub fn target(&self) -> ConversationStatus {
        match self {
            ConversationAction::Accept => ConversationStatus::Active,
            ConversationAction::Close => ConversationStatus::Closed,
        }
    }
}

/// Context for a state transition, including who triggered it
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub conversation_id: String,
    pub from_status: ConversationStatus,
    pub action: ConversationAction,
    pub actor_id: String,
}

/// Validates if a state transition is allowed.
///
/// The lifecycle only moves forward: pending -> active -> closed. Unlike
/// server-side status updates this is also strict about no-op transitions,
/// so accepting an already active conversation is rejected.
pub fn validate_transition(
    from: ConversationStatus,
    to: ConversationStatus,
) -> Result<(), TransitionError> {
    use ConversationStatus::*;

    match (from, to) {
        (Pending, Active) => Ok(()),
        (Active, Closed) => Ok(()),
        _ => Err(TransitionError::InvalidTransition { from, to }),
    }
}

fn rank(status: ConversationStatus) -> u8 {
    match status {
        ConversationStatus::Pending => 0,
        ConversationStatus::Active => 1,
        ConversationStatus::Closed => 2,
    }
}

/// Whether an externally observed status change keeps the lifecycle monotonic.
/// Server updates may repeat the current status or skip ahead (a pending
/// conversation abandoned by the patient is closed without being accepted).
pub fn is_forward_or_same(from: ConversationStatus, to: ConversationStatus) -> bool {
    rank(to) >= rank(from)
}

/// Validate an action against the current status and return the new status
pub fn execute_transition(context: &TransitionContext) -> Result<ConversationStatus, TransitionError> {
    let to_status = context.action.target();
    validate_transition(context.from_status, to_status)?;

    tracing::info!(
        "Executing state transition for conversation {} from {} to {} (actor {})",
        context.conversation_id,
        context.from_status,
        to_status,
        context.actor_id
    );

    Ok(to_status)
}
