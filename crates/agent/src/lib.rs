//! The agent orchestration loop — the heart of Ferrobot.
//!
//! Each inbound message drives a bounded cycle:
//!
//! 1. **Receive** a message from the bus (or the direct single-shot path)
//! 2. **Route** it: normal messages reply to their origin; system-origin
//!    messages carry a composite `channel:chat_id` key to route back to
//! 3. **Build context** from session history plus the new content
//! 4. **Call the LLM** via the configured provider
//! 5. **If tool calls**: execute them strictly in order, append results,
//!    loop back to step 4
//! 6. **If text**: persist the turn pair and publish the response
//!
//! The cycle ends when the model responds without tool calls or the
//! iteration budget is exhausted (which forces a fixed fallback response).

pub mod context;
pub mod loop_runner;

pub use context::ContextBuilder;
pub use loop_runner::{AgentLoop, FALLBACK_RESPONSE, LoopHandle};
