//! Who may interact with a stack

use crate::event::InboundEvent;
use crate::store::{Context, Stack};

/// Decides whether `principal` may act on `stack`
///
/// Runs before the manager is built, so a denied event never touches state.
pub trait StackAccessValidator: Send + Sync {
    fn is_allowed(
        &self,
        stack: &Stack,
        context: Option<&Context>,
        event: &InboundEvent,
        principal: i64,
    ) -> bool;
}

/// Private scopes are open; shared scopes check the allow-list
///
/// The top intent's access override wins over the stack's settings. An empty
/// allow-list in a shared scope admits only the stack's owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAccessValidator;

impl StackAccessValidator for DefaultAccessValidator {
    fn is_allowed(
        &self,
        stack: &Stack,
        context: Option<&Context>,
        event: &InboundEvent,
        principal: i64,
    ) -> bool {
        if event.chat.is_private() || stack.is_default() {
            return true;
        }
        let settings = context
            .and_then(|context| context.access_settings.as_ref())
            .unwrap_or(&stack.access_settings);
        if settings.user_ids.is_empty() {
            return !matches!(stack.owner_id, Some(owner) if owner != principal);
        }
        settings.allows(principal)
    }
}
