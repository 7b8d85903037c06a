//! The agent loop implementation.
//!
//! One loop instance owns its tool registry, MCP manager, and running flag,
//! and processes inbound messages strictly one at a time — session history
//! is appended in arrival order with no interleaving. Several independent
//! loop instances can run side by side without sharing state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use ferrobot_core::Result;
use ferrobot_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use ferrobot_core::message::Message;
use ferrobot_core::provider::{Provider, ProviderRequest};
use ferrobot_core::session::{SessionStore, TurnRole};
use ferrobot_core::tool::ToolRegistry;
use ferrobot_mcp::McpManager;

use crate::context::ContextBuilder;

/// Returned when the iteration budget is exhausted before the model
/// produces a tool-free response.
pub const FALLBACK_RESPONSE: &str =
    "I've completed processing but have no response to give.";

/// Channel used when a system-origin key carries no `channel:` prefix.
const DEFAULT_CHANNEL: &str = "cli";

/// How long to wait for an inbound message before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Budget for MCP teardown on the single-shot path.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// The core agent loop that orchestrates LLM calls and tool execution.
pub struct AgentLoop {
    bus: Arc<MessageBus>,
    provider: Arc<dyn Provider>,
    sessions: Arc<dyn SessionStore>,
    tools: ToolRegistry,
    mcp: Option<McpManager>,
    context: ContextBuilder,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: u32,
    running: Arc<AtomicBool>,
    mcp_started: bool,
}

/// A clonable handle for stopping a running loop from another task.
#[derive(Clone)]
pub struct LoopHandle {
    running: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Request a stop. Observed at the next poll boundary; an in-flight
    /// provider or tool call is not interrupted.
    pub fn stop(&self) {
        info!("Agent loop stopping");
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        bus: Arc<MessageBus>,
        provider: Arc<dyn Provider>,
        sessions: Arc<dyn SessionStore>,
        tools: ToolRegistry,
        model: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            provider,
            sessions,
            tools,
            mcp: None,
            context: ContextBuilder::new(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_iterations: 20,
            running: Arc::new(AtomicBool::new(false)),
            mcp_started: false,
        }
    }

    /// Attach an MCP manager; its tools are registered at startup.
    pub fn with_mcp_manager(mut self, manager: McpManager) -> Self {
        self.mcp = Some(manager);
        self
    }

    /// Set the maximum number of model-call/tool-execution rounds.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Replace the context builder (e.g. for a custom system prompt).
    pub fn with_context(mut self, context: ContextBuilder) -> Self {
        self.context = context;
        self
    }

    /// A handle that can stop this loop from another task.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            running: self.running.clone(),
        }
    }

    /// Run the agent loop, processing messages from the bus until stopped.
    ///
    /// MCP clients are connected before the first message is consumed and
    /// torn down after the loop exits, in this same task. A failure while
    /// processing one message becomes a best-effort error reply — it never
    /// terminates the loop.
    pub async fn run(&mut self) {
        self.running.store(true, Ordering::SeqCst);
        self.start_mcp().await;
        info!(model = %self.model, tools = self.tools.len(), "Agent loop started");

        while self.running.load(Ordering::SeqCst) {
            let msg = match timeout(POLL_INTERVAL, self.bus.consume_inbound()).await {
                // No message within the poll window; re-check the stop flag.
                Err(_) => continue,
                Ok(Err(e)) => {
                    warn!(error = %e, "Inbound queue closed, stopping loop");
                    break;
                }
                Ok(Ok(msg)) => msg,
            };

            self.handle_message(msg).await;
        }

        // Tear down MCP clients after the loop exits (same task)
        self.stop_mcp().await;
        info!("Agent loop stopped");
    }

    /// Process one message directly, outside the bus loop (CLI single-shot).
    ///
    /// Brackets MCP start/stop around the message when the manager was not
    /// already started, tearing down with a timeout and tolerating
    /// cancellation — teardown trouble must not error the caller.
    pub async fn process_direct(&mut self, content: &str, session_key: &str) -> Result<String> {
        let started_here = !self.mcp_started;
        if started_here {
            self.start_mcp().await;
        }

        let (channel, chat_id) = split_origin(session_key);
        let msg = InboundMessage::new(channel, "user", chat_id, content);
        let result = self.process_message(msg).await;

        if started_here {
            if let Some(manager) = self.mcp.as_mut() {
                if timeout(SHUTDOWN_TIMEOUT, manager.stop()).await.is_err() {
                    debug!("MCP teardown timed out during direct processing");
                }
            }
            self.mcp_started = false;
        }

        Ok(result?.map(|out| out.content).unwrap_or_default())
    }

    async fn start_mcp(&mut self) {
        if self.mcp_started {
            return;
        }
        if let Some(manager) = self.mcp.as_mut() {
            manager.start().await;
            manager.register_tools(&mut self.tools).await;
        }
        self.mcp_started = true;
    }

    async fn stop_mcp(&mut self) {
        if !self.mcp_started {
            return;
        }
        if let Some(manager) = self.mcp.as_mut() {
            manager.stop().await;
        }
        self.mcp_started = false;
    }

    /// Process one message and publish the outcome. All faults stop here.
    async fn handle_message(&mut self, msg: InboundMessage) {
        let reply_channel = msg.channel.clone();
        let reply_chat = msg.chat_id.clone();

        match self.process_message(msg).await {
            Ok(Some(response)) => {
                if let Err(e) = self.bus.publish_outbound(response).await {
                    error!(error = %e, "Failed to publish response");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Error processing message");
                let apology = OutboundMessage::new(
                    reply_channel,
                    reply_chat,
                    format!("Sorry, I encountered an error: {e}"),
                );
                if let Err(e) = self.bus.publish_outbound(apology).await {
                    error!(error = %e, "Failed to publish error response");
                }
            }
        }
    }

    /// Process a single inbound message into an optional response.
    async fn process_message(&mut self, msg: InboundMessage) -> Result<Option<OutboundMessage>> {
        // System-origin messages route back to the origin encoded in their key
        if msg.channel == "system" {
            return self.process_system_message(msg).await;
        }

        info!(channel = %msg.channel, sender = %msg.sender_id, "Processing message");

        let mut session = self.sessions.get_or_create(&msg.session_key()).await?;

        let remote_info = self.mcp.as_ref().and_then(|m| m.summary());
        let mut messages = self.context.build_messages(
            session.history(),
            &msg.content,
            &msg.media,
            remote_info.as_deref(),
        );

        let final_content = self.run_model_cycle(&mut messages).await?;

        // Exactly two turns per processed message, after the cycle finishes
        session.append(TurnRole::User, msg.content.as_str());
        session.append(TurnRole::Assistant, final_content.as_str());
        self.sessions.save(&session).await?;

        Ok(Some(OutboundMessage::new(
            msg.channel,
            msg.chat_id,
            final_content,
        )))
    }

    /// Process a system-origin message (e.g. a background task announce).
    ///
    /// The chat_id carries the original `channel:chat_id` to route the
    /// response back to; a key without a separator falls back to the
    /// default channel with the raw key as the chat id.
    async fn process_system_message(
        &mut self,
        msg: InboundMessage,
    ) -> Result<Option<OutboundMessage>> {
        info!(sender = %msg.sender_id, "Processing system message");

        let (origin_channel, origin_chat_id) = split_origin(&msg.chat_id);
        let session_key = format!("{origin_channel}:{origin_chat_id}");
        let mut session = self.sessions.get_or_create(&session_key).await?;

        let remote_info = self.mcp.as_ref().and_then(|m| m.summary());
        let mut messages = self.context.build_messages(
            session.history(),
            &msg.content,
            &[],
            remote_info.as_deref(),
        );

        let final_content = self.run_model_cycle(&mut messages).await?;

        session.append(
            TurnRole::User,
            format!("[System: {}] {}", msg.sender_id, msg.content),
        );
        session.append(TurnRole::Assistant, final_content.as_str());
        self.sessions.save(&session).await?;

        Ok(Some(OutboundMessage::new(
            origin_channel,
            origin_chat_id,
            final_content,
        )))
    }

    /// The bounded call/execute cycle.
    ///
    /// At most `max_iterations` provider calls are made. Tool calls run
    /// strictly sequentially in the order the provider returned them; each
    /// result is appended before the next call executes. Exhausting the
    /// budget forces the fallback response.
    async fn run_model_cycle(&self, messages: &mut Vec<Message>) -> Result<String> {
        let tool_definitions = self.tools.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(iteration, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;

            if response.message.tool_calls.is_empty() {
                // No tool calls — this is the final text response
                return Ok(response.message.content);
            }

            let tool_calls = response.message.tool_calls.clone();
            debug!(count = tool_calls.len(), "Executing tool calls");
            self.context
                .push_assistant(messages, &response.message.content, tool_calls.clone());

            for call in &tool_calls {
                debug!(tool = %call.name, call_id = %call.id, "Executing tool");
                let result = self
                    .tools
                    .execute(&call.name, call.parsed_arguments())
                    .await;
                self.context
                    .push_tool_result(messages, &call.id, &call.name, &result);
            }
        }

        warn!(
            max_iterations = self.max_iterations,
            "Iteration budget exhausted, forcing fallback response"
        );
        Ok(FALLBACK_RESPONSE.to_string())
    }
}

/// Split a composite `channel:chat_id` key on the first separator. A key
/// without a separator falls back to the default channel with the raw key
/// as the chat id.
fn split_origin(key: &str) -> (String, String) {
    match key.split_once(':') {
        Some((channel, chat_id)) => (channel.to_string(), chat_id.to_string()),
        None => (DEFAULT_CHANNEL.to_string(), key.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferrobot_core::error::{ProviderError, ToolError};
    use ferrobot_core::message::MessageToolCall;
    use ferrobot_core::provider::ProviderResponse;
    use ferrobot_core::tool::{Tool, ToolResult};
    use ferrobot_session::InMemorySessionStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    /// A provider that replays a scripted sequence of responses and records
    /// every request it receives.
    struct ScriptedProvider {
        responses: Mutex<VecDeque<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
        calls: AtomicU32,
        /// When the script runs dry: repeat the last response (for budget
        /// tests) or fail.
        repeat_last: Option<ProviderResponse>,
    }

    impl ScriptedProvider {
        fn scripted(responses: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                repeat_last: None,
            })
        }

        fn repeating(response: ProviderResponse) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                repeat_last: Some(response),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn request(&self, index: usize) -> ProviderRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            if let Some(response) = self.responses.lock().unwrap().pop_front() {
                return Ok(response);
            }
            if let Some(template) = &self.repeat_last {
                return Ok(template.clone());
            }
            Err(ProviderError::Network("script exhausted".into()))
        }
    }

    /// A provider that always fails.
    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Timeout("upstream timed out".into()))
        }
    }

    /// A tool that records its invocations in order.
    struct RecorderTool {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecorderTool {
        fn name(&self) -> &str {
            "recorder"
        }
        fn description(&self) -> &str {
            "Records invocations"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "label": { "type": "string" } }
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let label = arguments["label"].as_str().unwrap_or("?").to_string();
            self.log.lock().unwrap().push(label.clone());
            Ok(ToolResult::ok(format!("ran {label}")))
        }
    }

    fn text_response(content: &str) -> ProviderResponse {
        ProviderResponse {
            message: Message::assistant(content),
            model: "scripted-model".into(),
            usage: None,
        }
    }

    fn tool_call_response(calls: &[(&str, &str, &str)]) -> ProviderResponse {
        let tool_calls = calls
            .iter()
            .map(|(id, name, args)| MessageToolCall {
                id: (*id).into(),
                name: (*name).into(),
                arguments: (*args).into(),
            })
            .collect();
        ProviderResponse {
            message: Message::assistant_with_tool_calls("", tool_calls),
            model: "scripted-model".into(),
            usage: None,
        }
    }

    struct Harness {
        bus: Arc<MessageBus>,
        sessions: Arc<InMemorySessionStore>,
    }

    fn agent_with(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
    ) -> (AgentLoop, Harness) {
        let bus = Arc::new(MessageBus::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let agent = AgentLoop::new(
            bus.clone(),
            provider,
            sessions.clone(),
            tools,
            "scripted-model",
        );
        (agent, Harness { bus, sessions })
    }

    #[tokio::test]
    async fn end_to_end_single_call_no_tools() {
        let provider = ScriptedProvider::scripted(vec![text_response("4")]);
        let (mut agent, h) = agent_with(provider.clone(), ToolRegistry::new());

        let msg = InboundMessage::new("cli", "user", "direct", "2+2?");
        let out = agent.process_message(msg).await.unwrap().unwrap();

        // Exactly one provider call, the response routed back to the origin
        assert_eq!(provider.call_count(), 1);
        assert_eq!(out.channel, "cli");
        assert_eq!(out.chat_id, "direct");
        assert_eq!(out.content, "4");

        // Session grew by exactly two turns
        let session = h.sessions.get_or_create("cli:direct").await.unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[0].role, TurnRole::User);
        assert_eq!(session.history()[0].content, "2+2?");
        assert_eq!(session.history()[1].role, TurnRole::Assistant);
        assert_eq!(session.history()[1].content, "4");
    }

    #[tokio::test]
    async fn tool_calls_execute_sequentially_in_provider_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RecorderTool { log: log.clone() }));

        let provider = ScriptedProvider::scripted(vec![
            tool_call_response(&[
                ("call_1", "recorder", r#"{"label":"first"}"#),
                ("call_2", "recorder", r#"{"label":"second"}"#),
            ]),
            text_response("done"),
        ]);
        let (mut agent, _h) = agent_with(provider.clone(), tools);

        let msg = InboundMessage::new("cli", "user", "direct", "run things");
        let out = agent.process_message(msg).await.unwrap().unwrap();
        assert_eq!(out.content, "done");
        assert_eq!(provider.call_count(), 2);

        // Execution happened in provider order
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

        // The second request carries the assistant message plus exactly N
        // results, each correlated by invocation id, before the next call.
        let second = provider.request(1);
        let tail = &second.messages[second.messages.len() - 3..];
        assert_eq!(tail[0].tool_calls.len(), 2);
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tail[1].content, "ran first");
        assert_eq!(tail[2].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(tail[2].content, "ran second");
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_text_not_fault() {
        let provider = ScriptedProvider::scripted(vec![
            tool_call_response(&[("call_1", "no_such_tool", "{}")]),
            text_response("recovered"),
        ]);
        let (mut agent, _h) = agent_with(provider.clone(), ToolRegistry::new());

        let msg = InboundMessage::new("cli", "user", "direct", "go");
        let out = agent.process_message(msg).await.unwrap().unwrap();
        assert_eq!(out.content, "recovered");

        let second = provider.request(1);
        let result_msg = second.messages.last().unwrap();
        assert!(result_msg.content.contains("unknown tool 'no_such_tool'"));
    }

    #[tokio::test]
    async fn iteration_budget_forces_fallback() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(RecorderTool { log: log.clone() }));

        let provider = ScriptedProvider::repeating(tool_call_response(&[(
            "call_n",
            "recorder",
            r#"{"label":"again"}"#,
        )]));
        let (agent, h) = agent_with(provider.clone(), tools);
        let mut agent = agent.with_max_iterations(3);

        let msg = InboundMessage::new("cli", "user", "direct", "loop forever");
        let out = agent.process_message(msg).await.unwrap().unwrap();

        // The call count never exceeds the budget, and the fallback text is
        // distinguishable from any scripted model output.
        assert_eq!(provider.call_count(), 3);
        assert_eq!(out.content, FALLBACK_RESPONSE);

        let session = h.sessions.get_or_create("cli:direct").await.unwrap();
        assert_eq!(session.len(), 2);
        assert_eq!(session.history()[1].content, FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn system_message_routes_to_composite_origin() {
        let provider = ScriptedProvider::scripted(vec![text_response("report delivered")]);
        let (mut agent, h) = agent_with(provider, ToolRegistry::new());

        let msg = InboundMessage::new("system", "subagent-7", "alpha:42", "task finished");
        let out = agent.process_message(msg).await.unwrap().unwrap();

        assert_eq!(out.channel, "alpha");
        assert_eq!(out.chat_id, "42");
        assert_eq!(out.content, "report delivered");

        // Context lands in the origin session, marked as system input
        let session = h.sessions.get_or_create("alpha:42").await.unwrap();
        assert_eq!(session.len(), 2);
        assert!(session.history()[0].content.starts_with("[System: subagent-7]"));
    }

    #[tokio::test]
    async fn system_message_without_separator_falls_back() {
        let provider = ScriptedProvider::scripted(vec![text_response("ok")]);
        let (mut agent, _h) = agent_with(provider, ToolRegistry::new());

        let msg = InboundMessage::new("system", "subagent-7", "nosep", "task finished");
        let out = agent.process_message(msg).await.unwrap().unwrap();

        assert_eq!(out.channel, "cli");
        assert_eq!(out.chat_id, "nosep");
    }

    #[tokio::test]
    async fn provider_fault_leaves_session_untouched() {
        let (mut agent, h) = agent_with(Arc::new(FailingProvider), ToolRegistry::new());

        let msg = InboundMessage::new("cli", "user", "direct", "hello");
        let result = agent.process_message(msg).await;
        assert!(result.is_err());

        // No partial session writes for a message that failed mid-cycle
        assert!(h.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn run_loop_replies_and_stops_on_flag() {
        let provider = ScriptedProvider::scripted(vec![text_response("pong")]);
        let (mut agent, h) = agent_with(provider, ToolRegistry::new());
        let handle = agent.handle();

        let join = tokio::spawn(async move {
            agent.run().await;
        });

        h.bus
            .publish_inbound(InboundMessage::new("cli", "user", "direct", "ping"))
            .await
            .unwrap();

        let out = h.bus.consume_outbound().await.unwrap();
        assert_eq!(out.content, "pong");

        handle.stop();
        tokio::time::timeout(Duration::from_secs(3), join)
            .await
            .expect("loop did not stop after flag")
            .unwrap();
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn run_loop_converts_fault_into_error_reply() {
        let (mut agent, h) = agent_with(Arc::new(FailingProvider), ToolRegistry::new());
        let handle = agent.handle();

        let join = tokio::spawn(async move {
            agent.run().await;
        });

        h.bus
            .publish_inbound(InboundMessage::new("cli", "user", "direct", "hello"))
            .await
            .unwrap();

        // A single message's failure becomes a reply, not a dead loop
        let out = h.bus.consume_outbound().await.unwrap();
        assert_eq!(out.channel, "cli");
        assert_eq!(out.chat_id, "direct");
        assert!(out.content.starts_with("Sorry, I encountered an error"));

        handle.stop();
        tokio::time::timeout(Duration::from_secs(3), join)
            .await
            .expect("loop did not stop after flag")
            .unwrap();
    }

    #[tokio::test]
    async fn process_direct_returns_final_content() {
        let provider = ScriptedProvider::scripted(vec![text_response("direct answer")]);
        let (mut agent, h) = agent_with(provider, ToolRegistry::new());

        let answer = agent.process_direct("question", "cli:direct").await.unwrap();
        assert_eq!(answer, "direct answer");

        let session = h.sessions.get_or_create("cli:direct").await.unwrap();
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn split_origin_composite_key() {
        assert_eq!(split_origin("alpha:42"), ("alpha".into(), "42".into()));
        // Only the first separator splits
        assert_eq!(
            split_origin("telegram:chat:7"),
            ("telegram".into(), "chat:7".into())
        );
    }

    #[test]
    fn split_origin_without_separator_uses_default_channel() {
        assert_eq!(split_origin("nosep"), ("cli".into(), "nosep".into()));
    }
}
