//! Per-request transport between an HTTP exchange and the shared server
//!
//! Stateless JSON-response mode: each POST carries one JSON-RPC message or a
//! batch, and the reply is written as a single JSON body. A transport lives
//! for exactly one HTTP request and closes when dropped, which also covers
//! the client disconnecting mid-request.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;
use crate::mcp::rpc::{json_rpc_error, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::server::ProtocolServer;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum TransportReply {
    /// JSON-RPC response body (single object or batch array).
    Json(Value),
    /// Only notifications were received; nothing to answer.
    Accepted,
}

pub struct Transport {
    id: u64,
    server: Arc<ProtocolServer>,
    closed: AtomicBool,
}

impl Transport {
    pub fn connect(server: Arc<ProtocolServer>) -> Self {
        let id = NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed);
        let open = server.transport_opened();
        debug!(transport_id = id, open_transports = open, "transport opened");
        Self {
            id,
            server,
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let open = self.server.transport_closed();
            debug!(transport_id = self.id, open_transports = open, "transport closed");
        }
    }

    pub async fn handle_post(&self, body: &[u8]) -> Result<TransportReply, AppError> {
        if self.is_closed() {
            return Err(AppError::internal(format!(
                "transport {} used after close",
                self.id
            )));
        }

        let payload: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => {
                return Ok(TransportReply::Json(json_rpc_error(
                    None,
                    PARSE_ERROR,
                    "Parse error",
                )))
            }
        };

        if let Some(batch) = payload.as_array() {
            if batch.is_empty() {
                return Ok(TransportReply::Json(json_rpc_error(
                    None,
                    INVALID_REQUEST,
                    "Invalid Request",
                )));
            }

            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = self.server.handle_message(item.clone()).await? {
                    responses.push(response);
                }
            }

            if responses.is_empty() {
                return Ok(TransportReply::Accepted);
            }

            return Ok(TransportReply::Json(Value::Array(responses)));
        }

        Ok(match self.server.handle_message(payload).await? {
            Some(response) => TransportReply::Json(response),
            None => TransportReply::Accepted,
        })
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}
