//! Lazy projection strategy: ten generic tools parameterized by
//! `entity_set`/`function_name` (§4.4), regardless of schema size.

use rmcp::model::Tool;
use serde_json::json;

use crate::config::RuntimeConfig;
use crate::schema::Schema;

use super::schema_builder::ObjectSchemaBuilder;
use super::{GeneratedTool, Operation, ToolGenerator};

/// The fixed tool-name set lazy mode always emits, read tools first. Order
/// matches §4.4 so `tools/list` output is stable.
pub const LAZY_TOOL_NAMES: [&str; 10] = [
    "odata_service_info",
    "list_entities",
    "count_entities",
    "get_entity",
    "get_entity_schema",
    "create_entity",
    "update_entity",
    "delete_entity",
    "list_functions",
    "call_function",
];

pub struct LazyGenerator;

impl ToolGenerator for LazyGenerator {
    /// Lazy mode always emits the same ten tools: `-o`/`--read-only` narrow
    /// what dispatch will actually allow, not what gets generated (unlike
    /// eager mode's per-entity-set suppression in `eager.rs`).
    fn generate(_schema: &Schema, _config: &RuntimeConfig) -> Vec<GeneratedTool> {
        let mut tools = Vec::with_capacity(10);

        tools.push(GeneratedTool {
            tool: Tool::new(
                "odata_service_info",
                "Describe the bound OData service: version, namespace, entity sets, function imports",
                ObjectSchemaBuilder::new().build(),
            ),
            operation: Operation::ServiceInfo,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "list_entities",
                "List/query entities in a named entity set with OData query options",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .string("filter", "OData $filter expression", false)
                    .string("select", "comma-separated $select property list", false)
                    .string("expand", "comma-separated $expand navigation properties", false)
                    .string("orderby", "OData $orderby expression", false)
                    .integer("top", "maximum rows to return ($top)", false)
                    .integer("skip", "rows to skip ($skip)", false)
                    .boolean("count", "include a total row count alongside the page", false)
                    .string("search", "free-text search expression (entity set must be searchable)", false)
                    .build(),
            ),
            operation: Operation::ListEntities,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "count_entities",
                "Count entities in a named entity set, optionally matching an OData $filter",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .string("filter", "OData $filter expression", false)
                    .build(),
            ),
            operation: Operation::CountEntities,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "get_entity",
                "Fetch one entity by its key from a named entity set",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .field(
                        "key",
                        json!({ "type": "object", "description": "key property name/value pairs", "additionalProperties": true }),
                        true,
                    )
                    .build(),
            ),
            operation: Operation::GetEntity,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "get_entity_schema",
                "Describe an entity set's properties, keys, and capabilities",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .build(),
            ),
            operation: Operation::GetEntitySchema,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "create_entity",
                "Create a new entity in a named entity set",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .object("data", "entity property name/value pairs", true)
                    .build(),
            ),
            operation: Operation::CreateEntity,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "update_entity",
                "Update an existing entity by key in a named entity set",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .field(
                        "key",
                        json!({ "type": "object", "description": "key property name/value pairs", "additionalProperties": true }),
                        true,
                    )
                    .object("data", "entity property name/value pairs to merge", true)
                    .build(),
            ),
            operation: Operation::UpdateEntity,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "delete_entity",
                "Delete an entity by key from a named entity set",
                ObjectSchemaBuilder::new()
                    .string("entity_set", "target entity set name", true)
                    .field(
                        "key",
                        json!({ "type": "object", "description": "key property name/value pairs", "additionalProperties": true }),
                        true,
                    )
                    .build(),
            ),
            operation: Operation::DeleteEntity,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "list_functions",
                "List the OData function imports exposed by the service",
                ObjectSchemaBuilder::new().build(),
            ),
            operation: Operation::ListFunctions,
        });

        tools.push(GeneratedTool {
            tool: Tool::new(
                "call_function",
                "Invoke a named OData function import with parameters",
                ObjectSchemaBuilder::new()
                    .string("function_name", "target function import name", true)
                    .object("parameters", "function-import parameter name/value pairs", false)
                    .build(),
            ),
            operation: Operation::CallFunctionGeneric,
        });

        tools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::schema::ODataVersion;

    fn config() -> RuntimeConfig {
        RuntimeConfig::from_args(&Args {
            service: Some("https://example.org/svc".to_string()),
            service_positional: None,
            user: None,
            password: None,
            cookie_string: None,
            cookie_file: None,
            read_only: false,
            lazy_metadata: true,
            lazy_threshold: 0,
            operations: None,
            verbose: false,
        })
        .unwrap()
    }

    fn empty_schema() -> Schema {
        Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![],
            vec![],
        )
    }

    #[test]
    fn exactly_ten_tools_regardless_of_schema_size() {
        let tools = LazyGenerator::generate(&empty_schema(), &config());
        assert_eq!(tools.len(), 10);
        let names: Vec<_> = tools.iter().map(|t| t.tool.name.to_string()).collect();
        for expected in LAZY_TOOL_NAMES {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn read_only_still_emits_all_ten_tools() {
        let mut cfg = config();
        cfg.read_only = true;
        cfg.operations.create = false;
        cfg.operations.update = false;
        cfg.operations.delete = false;
        let tools = LazyGenerator::generate(&empty_schema(), &cfg);
        assert_eq!(tools.len(), 10);
        assert!(tools.iter().any(|t| t.operation.is_write()));
    }
}
