//! The MCP transport boundary: a thin `ServerHandler` wired to the Tool
//! Dispatcher, served over stdio (§6).

pub(crate) mod server;

pub use server::McpServer;
