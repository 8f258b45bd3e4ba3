//! Conversation adaptation per provider kind.

use gateway_core::{ChatMessage, MessageRole, ProviderKind, ProviderMessage, ProviderMessages};

/// Separator used when system content is merged into a user message
pub const SYSTEM_MERGE_SEPARATOR: &str = "\n\n";

/// Reshape a validated conversation for `kind`.
///
/// Providers with a system role receive the messages unchanged apart from
/// dropping caller metadata. For providers without one, system content is
/// prepended to the next user message; consecutive system messages are
/// joined first, and system content with no later user message is sent as a
/// user message of its own. Order is preserved.
#[must_use]
pub fn adapt(messages: &[ChatMessage], kind: ProviderKind) -> ProviderMessages {
    if kind.supports_system_role() {
        return messages
            .iter()
            .map(|m| ProviderMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
    }

    let mut adapted = Vec::with_capacity(messages.len());
    let mut pending_system: Option<String> = None;

    for message in messages {
        match message.role {
            MessageRole::System => {
                pending_system = Some(match pending_system.take() {
                    Some(previous) => {
                        format!("{previous}{SYSTEM_MERGE_SEPARATOR}{}", message.content)
                    }
                    None => message.content.clone(),
                });
            }
            MessageRole::User => {
                let content = match pending_system.take() {
                    Some(system) => {
                        format!("{system}{SYSTEM_MERGE_SEPARATOR}{}", message.content)
                    }
                    None => message.content.clone(),
                };
                adapted.push(ProviderMessage {
                    role: MessageRole::User,
                    content,
                });
            }
            MessageRole::Assistant => adapted.push(ProviderMessage {
                role: MessageRole::Assistant,
                content: message.content.clone(),
            }),
        }
    }

    if let Some(system) = pending_system {
        adapted.push(ProviderMessage {
            role: MessageRole::User,
            content: system,
        });
    }

    adapted
}
