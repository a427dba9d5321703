//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for the language models behind
//! each agent unit. It abstracts away provider-specific implementations behind
//! a common trait, so the coordination engine works with any supported LLM.
//!
//! # Architecture
//!
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - Runtime provider selection
//! - [`ProviderRegistry`] - Resolves model tiers and model names to clients
//!
//! # Supported Providers
//!
//! Enable providers via Cargo features:
//! - `ollama` - Local Ollama server (default)
//! - `openai` - OpenAI API and compatible endpoints
//!
//! # Streaming
//!
//! Providers implement `stream_with_system`, which returns a finite stream of
//! text chunks. The coordinator only streams the final synthesis step.

/// Core LLM client trait and streaming response types.
pub mod client;
/// Registry for managing multiple LLM provider instances.
pub mod provider_registry;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{LLMClient, Provider, TextStream};
pub use provider_registry::ProviderRegistry;
