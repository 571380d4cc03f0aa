//! Tool integrations
//!
//! Provides the OpenAI-backed tools exposed over the MCP protocol

pub mod tools;
