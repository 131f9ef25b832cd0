//! The MCP `ServerHandler` implementation (§6): `initialize` advertises
//! tool support, `tools/list` returns whatever the Tool Generator produced
//! for this service, and `tools/call` hands off to the Tool Dispatcher.
//!
//! Unlike a server built around compile-time `#[tool]` methods, the tool
//! surface here is data discovered from the bound service's `$metadata` at
//! startup, so `list_tools`/`call_tool` are overridden directly instead of
//! going through `#[tool_handler]`'s generated `ToolRouter`.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::service::RoleServer;
use rmcp::ErrorData as McpError;

use crate::dispatcher::{self, ServiceContext};

#[derive(Clone)]
pub struct McpServer {
    ctx: Arc<ServiceContext>,
}

impl McpServer {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Bridges the OData service at {} to MCP tools. Call odata_service_info or \
                 list the available tools to discover entity sets and function imports.",
                self.ctx.schema.service_root
            )),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.ctx.list_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        dispatcher::dispatch(&self.ctx, &request.name, request.arguments)
            .await
            .map_err(McpError::from)
    }
}
