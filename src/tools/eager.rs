//! Eager projection strategy: one set of typed tools per entity set
//! (§4.4), filtered by entity-set capability and the `-o`/`--operations`
//! override.

use rmcp::model::Tool;

use crate::config::RuntimeConfig;
use crate::schema::{FunctionImport, Schema};

use super::schema_builder::{edm_type_schema, entity_data_schema, key_properties_schema, ObjectSchemaBuilder};
use super::{GeneratedTool, Operation, ToolGenerator};

pub struct EagerGenerator;

impl ToolGenerator for EagerGenerator {
    fn generate(schema: &Schema, config: &RuntimeConfig) -> Vec<GeneratedTool> {
        let mut tools = Vec::new();
        let ops = config.operations;

        for set in &schema.entity_sets {
            let caps = &set.capabilities;
            let has_key = !set.entity_type.keys.is_empty();

            if caps.readable && ops.read {
                let filter_schema = ObjectSchemaBuilder::new()
                    .string("filter", "OData $filter expression", false)
                    .string("select", "comma-separated $select property list", false)
                    .string("expand", "comma-separated $expand navigation properties", false)
                    .string("orderby", "OData $orderby expression", false)
                    .integer("top", "maximum rows to return ($top)", false)
                    .integer("skip", "rows to skip ($skip)", false)
                    .boolean("count", "include a total row count alongside the page", false)
                    .build();
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("filter_{}", set.name),
                        format!("Query entities in {} with OData filter/select/expand/orderby/paging options", set.name),
                        filter_schema,
                    ),
                    operation: Operation::Filter(set.name.clone()),
                });

                let count_schema = ObjectSchemaBuilder::new()
                    .string("filter", "OData $filter expression", false)
                    .build();
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("count_{}", set.name),
                        format!("Count entities in {}, optionally matching an OData $filter", set.name),
                        count_schema,
                    ),
                    operation: Operation::Count(set.name.clone()),
                });

                if has_key {
                    let get_schema = key_properties_schema(set);
                    tools.push(GeneratedTool {
                        tool: Tool::new(
                            format!("get_{}", set.name),
                            format!("Fetch one {} entity by its key", set.name),
                            get_schema,
                        ),
                        operation: Operation::Get(set.name.clone()),
                    });
                }
            }

            if caps.searchable && ops.read {
                let search_schema = ObjectSchemaBuilder::new()
                    .string("search", "free-text search expression", true)
                    .integer("top", "maximum rows to return", false)
                    .build();
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("search_{}", set.name),
                        format!("Free-text search over {}", set.name),
                        search_schema,
                    ),
                    operation: Operation::Search(set.name.clone()),
                });
            }

            if caps.creatable && ops.create {
                let data_schema = entity_data_schema(&set.entity_type, true);
                let schema = ObjectSchemaBuilder::new()
                    .field("data", data_schema, true)
                    .build();
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("create_{}", set.name),
                        format!("Create a new {} entity", set.name),
                        schema,
                    ),
                    operation: Operation::Create(set.name.clone()),
                });
            }

            if caps.updatable && ops.update && has_key {
                let mut builder = ObjectSchemaBuilder::new();
                for key in set.entity_type.key_properties() {
                    builder = builder.field(&key.name, edm_type_schema(&key.edm_type), true);
                }
                let schema = builder
                    .field("data", entity_data_schema(&set.entity_type, false), true)
                    .build();
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("update_{}", set.name),
                        format!("Update an existing {} entity by key", set.name),
                        schema,
                    ),
                    operation: Operation::Update(set.name.clone()),
                });
            }

            if caps.deletable && ops.delete && has_key {
                let schema = key_properties_schema(set);
                tools.push(GeneratedTool {
                    tool: Tool::new(
                        format!("delete_{}", set.name),
                        format!("Delete a {} entity by key", set.name),
                        schema,
                    ),
                    operation: Operation::Delete(set.name.clone()),
                });
            }
        }

        for func in &schema.function_imports {
            tools.push(function_tool(func));
        }

        tools
    }
}

fn function_tool(func: &FunctionImport) -> GeneratedTool {
    let mut builder = ObjectSchemaBuilder::new();
    for param in &func.parameters {
        builder = builder.field(&param.name, edm_type_schema(&param.edm_type), !param.nullable);
    }
    GeneratedTool {
        tool: Tool::new(
            format!("call_{}", func.name),
            format!("Invoke the {} function import", func.name),
            builder.build(),
        ),
        operation: Operation::CallFunction(func.name.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Args;
    use crate::schema::{
        Cardinality, EdmType, EntitySet, EntitySetCapabilities, EntityType, FunctionReturnShape,
        HttpVerb, NavigationProperty, ODataVersion, Property,
    };

    fn full_entity_set(name: &str) -> EntitySet {
        let _ = NavigationProperty {
            name: "Unused".to_string(),
            target_entity_set: "X".to_string(),
            cardinality: Cardinality::Many,
        };
        EntitySet {
            name: name.to_string(),
            entity_type: EntityType {
                name: format!("{name}Type"),
                keys: vec!["Id".to_string()],
                properties: vec![
                    Property {
                        name: "Id".to_string(),
                        edm_type: EdmType::Int32,
                        nullable: false,
                        max_length: None,
                        precision: None,
                        scale: None,
                    },
                    Property {
                        name: "Name".to_string(),
                        edm_type: EdmType::String,
                        nullable: true,
                        max_length: Some(40),
                        precision: None,
                        scale: None,
                    },
                ],
                navigation_properties: vec![],
            },
            capabilities: EntitySetCapabilities {
                readable: true,
                creatable: true,
                updatable: true,
                deletable: true,
                searchable: true,
            },
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig::from_args(&Args {
            service: Some("https://example.org/svc".to_string()),
            service_positional: None,
            user: None,
            password: None,
            cookie_string: None,
            cookie_file: None,
            read_only: false,
            lazy_metadata: false,
            lazy_threshold: 0,
            operations: None,
            verbose: false,
        })
        .unwrap()
    }

    #[test]
    fn full_capability_entity_set_emits_seven_tools() {
        let schema = Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![full_entity_set("Products")],
            vec![],
        );
        let tools = EagerGenerator::generate(&schema, &config());
        let names: Vec<_> = tools.iter().map(|t| t.tool.name.to_string()).collect();
        assert_eq!(tools.len(), 7, "expected 7 tools, got {names:?}");
        for expected in [
            "filter_Products",
            "count_Products",
            "search_Products",
            "get_Products",
            "create_Products",
            "update_Products",
            "delete_Products",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected} in {names:?}");
        }
    }

    #[test]
    fn read_only_config_suppresses_write_tools() {
        let schema = Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![full_entity_set("Products")],
            vec![],
        );
        let mut cfg = config();
        cfg.operations.create = false;
        cfg.operations.update = false;
        cfg.operations.delete = false;
        let tools = EagerGenerator::generate(&schema, &cfg);
        assert!(!tools.iter().any(|t| t.operation.is_write()));
    }

    #[test]
    fn keyless_entity_set_omits_singular_key_operations() {
        let mut set = full_entity_set("Logs");
        set.entity_type.keys.clear();
        set.capabilities.creatable = false;
        set.capabilities.updatable = false;
        set.capabilities.deletable = false;
        let schema = Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![set],
            vec![],
        );
        let tools = EagerGenerator::generate(&schema, &config());
        let names: Vec<_> = tools.iter().map(|t| t.tool.name.to_string()).collect();
        assert!(!names.contains(&"get_Logs".to_string()));
        assert!(names.contains(&"filter_Logs".to_string()));
    }

    #[test]
    fn function_import_projects_to_call_tool() {
        let schema = Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![],
            vec![crate::schema::FunctionImport {
                name: "GetProductsByCategory".to_string(),
                http_method: HttpVerb::Get,
                parameters: vec![crate::schema::FunctionParameter {
                    name: "CategoryID".to_string(),
                    edm_type: EdmType::Int32,
                    nullable: false,
                }],
                return_shape: FunctionReturnShape::Collection,
            }],
        );
        let tools = EagerGenerator::generate(&schema, &config());
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].tool.name, "call_GetProductsByCategory");
    }
}
