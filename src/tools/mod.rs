//! The Tool Generator (§4.4): projects a [`crate::schema::Schema`] into MCP
//! tool definitions, via one of two interchangeable strategies.

pub mod eager;
pub mod lazy;
pub mod schema_builder;

use rmcp::model::Tool;

use crate::config::RuntimeConfig;
use crate::schema::Schema;

/// The OData operation a generated tool is bound to — the handler identity
/// of §3's `Tool` data model. Never serialized to the client; only
/// name/description/inputSchema cross the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Filter(String),
    Count(String),
    Search(String),
    Get(String),
    Create(String),
    Update(String),
    Delete(String),
    CallFunction(String),

    ServiceInfo,
    ListEntities,
    CountEntities,
    GetEntity,
    GetEntitySchema,
    CreateEntity,
    UpdateEntity,
    DeleteEntity,
    ListFunctions,
    CallFunctionGeneric,
}

impl Operation {
    /// Write operations are the ones `--read-only` suppresses/refuses.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::Create(_)
                | Operation::Update(_)
                | Operation::Delete(_)
                | Operation::CreateEntity
                | Operation::UpdateEntity
                | Operation::DeleteEntity
        )
    }
}

/// A generated tool paired with the operation it dispatches to.
#[derive(Clone)]
pub struct GeneratedTool {
    pub tool: Tool,
    pub operation: Operation,
}

/// Two implementations — [`eager`] and [`lazy`] — share this contract so
/// the dispatcher and `tools/list` handler don't need to know which
/// strategy produced the tool set.
pub trait ToolGenerator {
    fn generate(schema: &Schema, config: &RuntimeConfig) -> Vec<GeneratedTool>;
}

/// Estimates the eager tool count without actually building tool
/// definitions, used by [`select_strategy`] to decide eager vs. lazy.
/// Counts 2–7 operations per entity set based on capability flags, plus one
/// per function import (§4.4 "Selection").
pub fn estimate_eager_tool_count(schema: &Schema) -> usize {
    let mut count = 0;
    for set in &schema.entity_sets {
        let caps = &set.capabilities;
        if caps.readable {
            count += 2; // filter_<E>, count_<E>
            if !set.entity_type.keys.is_empty() {
                count += 1; // get_<E>
            }
        }
        if caps.searchable {
            count += 1;
        }
        if caps.creatable {
            count += 1;
        }
        if caps.updatable && !set.entity_type.keys.is_empty() {
            count += 1;
        }
        if caps.deletable && !set.entity_type.keys.is_empty() {
            count += 1;
        }
    }
    count + schema.function_imports.len()
}

/// Lazy mode is used when `lazy_metadata=true` OR (`lazy_threshold>0` AND
/// the estimated eager tool count meets or exceeds it) (§4.4 "Selection").
pub fn should_use_lazy(schema: &Schema, config: &RuntimeConfig) -> bool {
    if config.lazy_metadata {
        return true;
    }
    config.lazy_threshold > 0 && estimate_eager_tool_count(schema) >= config.lazy_threshold
}

/// Builds the full tool surface for a loaded schema, selecting eager or
/// lazy per [`should_use_lazy`].
pub fn generate_tools(schema: &Schema, config: &RuntimeConfig) -> Vec<GeneratedTool> {
    if should_use_lazy(schema, config) {
        lazy::LazyGenerator::generate(schema, config)
    } else {
        eager::EagerGenerator::generate(schema, config)
    }
}
