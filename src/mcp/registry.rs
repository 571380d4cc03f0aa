//! Tool registry and dispatcher
//!
//! Tools are registered once through [`ToolRegistryBuilder`]; the resulting
//! [`ToolRegistry`] has no mutating API and is shared read-only by every
//! request. Arguments are validated by deserializing them into the tool's
//! input type before the handler runs.

use std::{future::Future, pin::Pin, sync::Arc};

use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent, Tool};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::AppError;

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<ContentBlock>, AppError>> + Send>>;
type ErasedHandler =
    Arc<dyn Fn(Map<String, Value>) -> Result<HandlerFuture, String> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error(transparent)]
    Handler(#[from] AppError),
}

struct ToolDefinition {
    tool: Tool,
    handler: ErasedHandler,
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `tool.name`; its arguments arrive as `A`.
    pub fn register<A, H, Fut>(mut self, tool: Tool, handler: H) -> Result<Self, RegistryError>
    where
        A: DeserializeOwned + Send + 'static,
        H: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ContentBlock>, AppError>> + Send + 'static,
    {
        if self
            .definitions
            .iter()
            .any(|definition| definition.tool.name == tool.name)
        {
            return Err(RegistryError::DuplicateTool(tool.name));
        }

        let invoke: ErasedHandler = Arc::new(
            move |arguments: Map<String, Value>| -> Result<HandlerFuture, String> {
                let input: A = serde_json::from_value(Value::Object(arguments))
                    .map_err(|err| err.to_string())?;
                Ok(Box::pin(handler(input)))
            },
        );

        tracing::debug!(tool = %tool.name, "registered tool");
        self.definitions.push(ToolDefinition {
            tool,
            handler: invoke,
        });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            definitions: Arc::from(self.definitions),
        }
    }
}

#[derive(Clone)]
pub struct ToolRegistry {
    definitions: Arc<[ToolDefinition]>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Tool descriptors in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.definitions
            .iter()
            .map(|definition| definition.tool.clone())
            .collect()
    }

    fn find(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.tool.name == name)
    }

    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, DispatchError> {
        let definition = self
            .find(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;

        let pending = (definition.handler)(arguments.unwrap_or_default()).map_err(|message| {
            DispatchError::InvalidArguments {
                tool: name.to_string(),
                message,
            }
        })?;

        let content = pending.await?;
        Ok(CallToolResult {
            content,
            is_error: None,
            meta: None,
            structured_content: None,
        })
    }
}

/// Renders `value` as two-space indented JSON in a single text block.
pub fn pretty_json_content(value: &Value) -> Result<Vec<ContentBlock>, AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::internal(format!("failed to render tool output: {err}")))?;
    Ok(vec![ContentBlock::from(TextContent::new(text, None, None))])
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_mcp_sdk::macros;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;

    #[macros::mcp_tool(name = "echo", description = "Echo a word back")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    struct EchoTool {
        word: String,
    }

    #[macros::mcp_tool(name = "zeta", description = "Registered first")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    struct ZetaTool {}

    #[macros::mcp_tool(name = "alpha", description = "Registered second")]
    #[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
    struct AlphaTool {}

    fn echo_registry(calls: Arc<AtomicUsize>) -> ToolRegistry {
        ToolRegistry::builder()
            .register(EchoTool::tool(), move |input: EchoTool| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    pretty_json_content(&json!({ "word": input.word }))
                }
            })
            .expect("register echo")
            .build()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let error = ToolRegistry::builder()
            .register(EchoTool::tool(), |_: EchoTool| async { Ok(vec![]) })
            .expect("first registration")
            .register(EchoTool::tool(), |_: EchoTool| async { Ok(vec![]) })
            .err()
            .expect("second registration must fail");

        assert_eq!(error, RegistryError::DuplicateTool("echo".to_string()));
    }

    #[test]
    fn tools_are_listed_in_registration_order() {
        let registry = ToolRegistry::builder()
            .register(ZetaTool::tool(), |_: ZetaTool| async { Ok(vec![]) })
            .and_then(|builder| {
                builder.register(AlphaTool::tool(), |_: AlphaTool| async { Ok(vec![]) })
            })
            .expect("registrations")
            .build();

        let names: Vec<String> = registry.tools().into_iter().map(|tool| tool.name).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn dispatch_wraps_handler_output() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = echo_registry(Arc::clone(&calls));

        let arguments = json!({ "word": "hi" }).as_object().cloned();
        let result = registry
            .dispatch("echo", arguments)
            .await
            .expect("dispatch succeeds");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let rendered = serde_json::to_value(&result).expect("serialize result");
        assert_eq!(rendered["content"][0]["type"], "text");
        assert_eq!(rendered["content"][0]["text"], "{\n  \"word\": \"hi\"\n}");
    }

    #[tokio::test]
    async fn invalid_arguments_skip_the_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = echo_registry(Arc::clone(&calls));

        let error = registry
            .dispatch("echo", None)
            .await
            .expect_err("missing field must fail");

        match error {
            DispatchError::InvalidArguments { tool, message } => {
                assert_eq!(tool, "echo");
                assert!(message.contains("word"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrongly_typed_arguments_are_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = echo_registry(Arc::clone(&calls));

        let error = registry
            .dispatch("echo", json!({ "word": 42 }).as_object().cloned())
            .await
            .expect_err("integer word must fail");

        assert!(matches!(error, DispatchError::InvalidArguments { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let registry = echo_registry(Arc::new(AtomicUsize::new(0)));
        let error = registry
            .dispatch("nope", None)
            .await
            .expect_err("unknown tool must fail");
        assert!(matches!(error, DispatchError::UnknownTool(name) if name == "nope"));
    }

    #[tokio::test]
    async fn handler_errors_propagate() {
        let registry = ToolRegistry::builder()
            .register(EchoTool::tool(), |_: EchoTool| async {
                Err(AppError::upstream(Some(500), "boom"))
            })
            .expect("register")
            .build();

        let error = registry
            .dispatch("echo", json!({ "word": "x" }).as_object().cloned())
            .await
            .expect_err("handler failure must propagate");
        assert!(matches!(
            error,
            DispatchError::Handler(AppError::Upstream { .. })
        ));
    }
}
