//! Context builder — assembles the model-call message sequence.
//!
//! Turns a session history plus the new inbound content into the ordered
//! sequence sent to the provider, and appends assistant/tool-result messages
//! as the cycle progresses.

use ferrobot_core::message::{Message, MessageToolCall};
use ferrobot_core::session::{Turn, TurnRole};
use tracing::debug;

const BASE_PROMPT: &str = "You are Ferrobot, a helpful assistant reachable from chat channels. \
You can use the available tools to act on the user's behalf. Prefer acting \
over asking when a tool can answer the question. Keep responses concise and \
suitable for a chat window.";

/// Builds and extends the model-call message sequence.
pub struct ContextBuilder {
    base_prompt: String,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            base_prompt: BASE_PROMPT.to_string(),
        }
    }

    /// Override the base system prompt.
    pub fn with_base_prompt(prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: prompt.into(),
        }
    }

    /// Build the initial message sequence: system prompt first, the session
    /// history in order, then the new user message. Connected remote-server
    /// info, when present, is folded into the system prompt; media
    /// references are appended to the user content.
    pub fn build_messages(
        &self,
        history: &[Turn],
        current: &str,
        media: &[String],
        remote_info: Option<&str>,
    ) -> Vec<Message> {
        let mut system = self.base_prompt.clone();
        if let Some(info) = remote_info {
            system.push_str("\n\n## Connected MCP servers\n");
            system.push_str(info);
        }

        let mut messages = vec![Message::system(system)];

        for turn in history {
            messages.push(match turn.role {
                TurnRole::User => Message::user(turn.content.clone()),
                TurnRole::Assistant => Message::assistant(turn.content.clone()),
            });
        }

        let mut content = current.to_string();
        if !media.is_empty() {
            content.push_str("\n\nAttached media:");
            for item in media {
                content.push_str("\n- ");
                content.push_str(item);
            }
        }
        messages.push(Message::user(content));

        messages
    }

    /// Append the assistant message that carried tool calls.
    pub fn push_assistant(
        &self,
        messages: &mut Vec<Message>,
        content: &str,
        tool_calls: Vec<MessageToolCall>,
    ) {
        messages.push(Message::assistant_with_tool_calls(content, tool_calls));
    }

    /// Append one tool result, correlated to its invocation id.
    pub fn push_tool_result(
        &self,
        messages: &mut Vec<Message>,
        call_id: &str,
        tool_name: &str,
        result: &str,
    ) {
        debug!(tool = %tool_name, call_id, "Appending tool result");
        messages.push(Message::tool_result(call_id, result));
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrobot_core::message::Role;
    use ferrobot_core::session::Session;

    fn history() -> Session {
        let mut session = Session::new("test:history");
        session.append(TurnRole::User, "earlier question");
        session.append(TurnRole::Assistant, "earlier answer");
        session
    }

    #[test]
    fn system_prompt_comes_first() {
        let builder = ContextBuilder::new();
        let messages = builder.build_messages(&[], "hello", &[], None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "hello");
    }

    #[test]
    fn history_preserved_in_order() {
        let builder = ContextBuilder::new();
        let messages = builder.build_messages(history().history(), "new question", &[], None);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].content, "earlier answer");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].content, "new question");
    }

    #[test]
    fn remote_info_folded_into_system_prompt() {
        let builder = ContextBuilder::new();
        let messages =
            builder.build_messages(&[], "hi", &[], Some("- **fs** (stdio): `npx`"));
        assert!(messages[0].content.contains("Connected MCP servers"));
        assert!(messages[0].content.contains("**fs**"));
    }

    #[test]
    fn media_appended_to_user_content() {
        let builder = ContextBuilder::new();
        let media = vec!["/tmp/photo.jpg".to_string()];
        let messages = builder.build_messages(&[], "look at this", &media, None);
        let user = &messages[1];
        assert!(user.content.contains("look at this"));
        assert!(user.content.contains("/tmp/photo.jpg"));
    }

    #[test]
    fn tool_result_carries_invocation_id() {
        let builder = ContextBuilder::new();
        let mut messages = builder.build_messages(&[], "q", &[], None);
        builder.push_assistant(
            &mut messages,
            "",
            vec![MessageToolCall {
                id: "call_9".into(),
                name: "shell".into(),
                arguments: "{}".into(),
            }],
        );
        builder.push_tool_result(&mut messages, "call_9", "shell", "output text");

        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert_eq!(last.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(last.content, "output text");
    }

    #[test]
    fn custom_base_prompt() {
        let builder = ContextBuilder::with_base_prompt("You are a test harness.");
        let messages = builder.build_messages(&[], "x", &[], None);
        assert_eq!(messages[0].content, "You are a test harness.");
    }
}
