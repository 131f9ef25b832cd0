//! odata-mcp-bridge — bridges an OData v2/v4 service to a tool-providing
//! Model Context Protocol endpoint.

pub mod config;
pub mod credentials;
pub mod csrf;
pub mod dispatcher;
pub mod error;
pub mod http_client;
pub mod mcp;
pub mod metadata;
pub mod normalizer;
pub mod schema;
pub mod tools;
