//! Tools exposed via Model Context Protocol
//!
//! Each tool forwards one call to the upstream API and hands the response back
//! verbatim as pretty-printed JSON.

use std::sync::Arc;

use rust_mcp_sdk::{
    macros,
    schema::ContentBlock,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::{
    errors::AppError,
    mcp::registry::{pretty_json_content, RegistryError, ToolRegistry},
    upstream::{HttpMethod, UpstreamApi},
};

#[macros::mcp_tool(name = "chat", description = "Send a chat prompt to OpenAI models")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct ChatTool {
    pub model: String,
    pub prompt: String,
}

#[macros::mcp_tool(name = "models", description = "List available OpenAI models")]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct ModelsTool {}

#[macros::mcp_tool(
    name = "embeddings",
    description = "Generate OpenAI embeddings for text"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct EmbeddingsTool {
    pub model: String,
    pub text: String,
}

pub async fn chat(
    upstream: &dyn UpstreamApi,
    input: ChatTool,
) -> Result<Vec<ContentBlock>, AppError> {
    info!(
        tool = "chat",
        model = %input.model,
        prompt_chars = input.prompt.chars().count(),
        "tool called"
    );

    let data = upstream
        .request(
            HttpMethod::Post,
            "/chat/completions",
            Some(json!({
                "model": input.model,
                "messages": [{ "role": "user", "content": input.prompt }],
            })),
        )
        .await?;

    pretty_json_content(&data)
}

pub async fn models(
    upstream: &dyn UpstreamApi,
    _input: ModelsTool,
) -> Result<Vec<ContentBlock>, AppError> {
    info!(tool = "models", "tool called");

    let data = upstream.request(HttpMethod::Get, "/models", None).await?;
    pretty_json_content(&data)
}

pub async fn embeddings(
    upstream: &dyn UpstreamApi,
    input: EmbeddingsTool,
) -> Result<Vec<ContentBlock>, AppError> {
    info!(
        tool = "embeddings",
        model = %input.model,
        text_chars = input.text.chars().count(),
        "tool called"
    );

    let data = upstream
        .request(
            HttpMethod::Post,
            "/embeddings",
            Some(json!({
                "input": input.text,
                "model": input.model,
            })),
        )
        .await?;

    pretty_json_content(&data)
}

/// Registers `chat`, `models` and `embeddings` against `upstream`.
pub fn build_registry(upstream: Arc<dyn UpstreamApi>) -> Result<ToolRegistry, RegistryError> {
    let chat_upstream = Arc::clone(&upstream);
    let models_upstream = Arc::clone(&upstream);
    let embeddings_upstream = upstream;

    let registry = ToolRegistry::builder()
        .register(ChatTool::tool(), move |input: ChatTool| {
            let upstream = Arc::clone(&chat_upstream);
            async move { chat(upstream.as_ref(), input).await }
        })?
        .register(ModelsTool::tool(), move |input: ModelsTool| {
            let upstream = Arc::clone(&models_upstream);
            async move { models(upstream.as_ref(), input).await }
        })?
        .register(EmbeddingsTool::tool(), move |input: EmbeddingsTool| {
            let upstream = Arc::clone(&embeddings_upstream);
            async move { embeddings(upstream.as_ref(), input).await }
        })?
        .build();

    for tool in registry.tools() {
        info!(tool = %tool.name, "registered tool");
    }

    Ok(registry)
}
