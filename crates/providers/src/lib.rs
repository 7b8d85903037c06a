//! LLM provider implementations for Ferrobot.
//!
//! One implementation covers nearly every hosted backend: the
//! OpenAI-compatible chat-completions protocol (OpenRouter, OpenAI, Ollama,
//! vLLM, Together, ...). The agent loop only sees the `Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
