//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC validation, negotiation,
//! formatting, tool dispatch and the per-request transport.

pub mod registry;
pub mod rpc;
pub mod server;
pub mod transport;
