//! JSON-RPC protocol representations and formatting utilities
//!
//! Builds the result and error envelopes the MCP endpoint answers with.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Value};

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const SERVER_ERROR: i32 = -32000;

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let Some(request_id) = id.as_ref().and_then(value_to_request_id) else {
        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(data) = data {
            error["data"] = data;
        }
        return json!({
            "jsonrpc": "2.0",
            "error": error,
            "id": null
        });
    };

    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data,
            message: message.to_string(),
        },
        Some(request_id),
    );
    serde_json::to_value(response).expect("jsonrpc error response serialization")
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        return serde_json::to_value(response).expect("jsonrpc result response serialization");
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_without_id_uses_null_id() {
        let value = json_rpc_error(None, INTERNAL_ERROR, "Internal server error");
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "error": { "code": -32603, "message": "Internal server error" },
                "id": null
            })
        );
    }

    #[test]
    fn error_with_id_echoes_id() {
        let value = json_rpc_error(Some(json!(7)), METHOD_NOT_FOUND, "Method not found");
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], -32601);
        assert!(is_json_rpc_error(&value));
    }

    #[test]
    fn result_with_string_id_keeps_fields() {
        let value = json_rpc_result(Some(json!("abc")), json!({ "tools": [] }));
        assert_eq!(value["id"], "abc");
        assert_eq!(value["result"]["tools"], json!([]));
        assert!(!is_json_rpc_error(&value));
    }
}
