//! The central Model Context Protocol engine
//!
//! Provides the primary MCP JSON-RPC decoding, method execution routing, capabilities
//! negotiation (`initialize`), and routing of `tools/call` into the tool registry.

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest,
    ServerCapabilities, ServerCapabilitiesTools,
};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{json, Value};
use tracing::info;

use crate::errors::AppError;
use crate::mcp::registry::{DispatchError, ToolRegistry};
use crate::mcp::rpc::{
    is_json_rpc_error, json_rpc_error, json_rpc_error_with_data,
    json_rpc_result, request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};

pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";
pub const SUPPORTED_PROTOCOL_VERSIONS: [&str; 3] = ["2025-06-18", "2025-03-26", "2024-11-05"];

/// Process-wide MCP server; shared read-only by every transport.
pub struct ProtocolServer {
    name: String,
    version: String,
    registry: ToolRegistry,
    open_transports: AtomicUsize,
}

impl ProtocolServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self::with_identity(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), registry)
    }

    pub fn with_identity(
        name: impl Into<String>,
        version: impl Into<String>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            registry,
            open_transports: AtomicUsize::new(0),
        }
    }

    /// Number of transports currently bound to this server.
    pub fn open_transports(&self) -> usize {
        self.open_transports.load(Ordering::SeqCst)
    }

    pub(crate) fn transport_opened(&self) -> usize {
        self.open_transports.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn transport_closed(&self) -> usize {
        self.open_transports.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Handles one decoded JSON-RPC message. Returns `Ok(None)` for
    /// notifications; `Err` only for failures that must abort the HTTP request.
    pub async fn handle_message(&self, payload: Value) -> Result<Option<Value>, AppError> {
        if !payload.is_object() {
            return Ok(Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request")));
        }

        let request_id = payload.get("id").cloned();
        if let Some(id) = &request_id {
            // Present ids must be a string or an integer; `null` is not a notification.
            if !(id.is_string() || id.is_i64()) {
                return Ok(Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request")));
            }
        }

        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => {
                return Ok(Some(json_rpc_error(
                    request_id,
                    INVALID_REQUEST,
                    "Invalid Request",
                )))
            }
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                if let Err(error_response) = validate_request_shape(&request) {
                    return Ok(Some(error_response));
                }

                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Ok(Some(json_rpc_error(
                        Some(request_id),
                        INVALID_REQUEST,
                        "Invalid Request",
                    )));
                }

                self.handle_request(
                    Some(request_id),
                    request.method,
                    request.params.map(Value::Object),
                )
                .await
                .map(Some)
            }
            JsonrpcMessage::Notification(notification) => {
                info!(method = %notification.method, "mcp notification received");
                Ok(None)
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => Ok(Some(
                json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"),
            )),
        }
    }

    pub async fn handle_request(
        &self,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Result<Value, AppError> {
        let audit_params = redact_audit_params(params.as_ref());

        let outcome = match method.as_str() {
            "initialize" => Ok(self.initialize(id, params.as_ref())),
            "ping" => Ok(json_rpc_result(id, json!({}))),
            "tools/list" => Ok(json_rpc_result(
                id,
                serde_json::to_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: self.registry.tools(),
                })
                .expect("tools list result serialization"),
            )),
            "tools/call" => self.call_tool(id, params).await,
            _ => Ok(json_rpc_error(id, METHOD_NOT_FOUND, "Method not found")),
        };

        let outcome_label = match &outcome {
            Ok(response) if !is_json_rpc_error(response) => "success",
            Ok(_) => "failure",
            Err(_) => "error",
        };
        info!(
            method = %method,
            params = %audit_params,
            outcome = outcome_label,
            "mcp action audited"
        );

        outcome
    }

    fn initialize(&self, id: Option<Value>, params: Option<&Value>) -> Value {
        let Some(protocol_version) = negotiate_protocol_version(params) else {
            return json_rpc_error_with_data(
                id,
                INVALID_PARAMS,
                "Invalid params",
                Some(json!({
                    "code": "invalid_protocol_version",
                    "message": "initialize params.protocolVersion is required",
                    "details": {},
                })),
            );
        };

        let initialize_result = InitializeResult {
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                title: None,
                description: None,
                icons: vec![],
                website_url: None,
            },
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools {
                    list_changed: Some(false),
                }),
                resources: None,
                prompts: None,
                ..Default::default()
            },
            protocol_version: protocol_version.to_string(),
            instructions: None,
            meta: None,
        };

        json_rpc_result(
            id,
            serde_json::to_value(initialize_result).expect("initialize result serialization"),
        )
    }

    async fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> Result<Value, AppError> {
        let Some(raw_params) = params else {
            return Ok(json_rpc_error(id, INVALID_PARAMS, "Invalid params"));
        };

        let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
            Ok(value) => value,
            Err(_) => return Ok(json_rpc_error(id, INVALID_PARAMS, "Invalid params")),
        };

        match self
            .registry
            .dispatch(&tool_call.name, tool_call.arguments)
            .await
        {
            Ok(result) => Ok(json_rpc_result(
                id,
                serde_json::to_value(result).expect("tool result serialization"),
            )),
            Err(DispatchError::UnknownTool(name)) => Ok(json_rpc_error_with_data(
                id,
                METHOD_NOT_FOUND,
                "Method not found",
                Some(json!({
                    "code": "tool_not_found",
                    "message": "unknown tool name",
                    "details": {
                        "name": name,
                    },
                })),
            )),
            Err(DispatchError::InvalidArguments { tool, message }) => Ok(json_rpc_error_with_data(
                id,
                INVALID_PARAMS,
                "Invalid params",
                Some(json!({
                    "code": "invalid_arguments",
                    "message": message,
                    "details": {
                        "tool": tool,
                    },
                })),
            )),
            Err(DispatchError::Handler(err)) => Err(err),
        }
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let request_id = Some(request_id_to_value(request.id.clone()));
    let Ok(payload) = serde_json::to_value(request) else {
        return Err(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"));
    };

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

/// Echoes the client's version when supported, otherwise offers the latest.
/// `None` when the client sent no version at all.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Option<&'static str> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())?;

    Some(
        SUPPORTED_PROTOCOL_VERSIONS
            .into_iter()
            .find(|version| *version == offered_version)
            .unwrap_or(LATEST_PROTOCOL_VERSION),
    )
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else if let Some(text) = item.as_str().filter(|_| is_free_text_key(key)) {
                        (key.clone(), Value::String(format!("[{} chars]", text.chars().count())))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey" | "externalapikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}

/// Keys whose values are caller-authored text; only their length is audited.
fn is_free_text_key(key: &str) -> bool {
    matches!(key, "prompt" | "text" | "input")
}
