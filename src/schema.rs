//! In-memory representation of an OData service's `$metadata`.
//!
//! Everything here is pure data, built once by [`crate::metadata`] and then
//! shared read-only (behind an `Arc`) by the tool generator and dispatcher.

use std::collections::HashMap;

/// The OData protocol version a service speaks. Affects date encoding,
/// count/query-option syntax, and the PATCH-vs-MERGE verb for updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataVersion {
    V2,
    V4,
}

/// An EDM primitive type, as declared on a `Property` or `Parameter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdmType {
    String,
    Boolean,
    Byte,
    SByte,
    Int16,
    Int32,
    Int64,
    Decimal,
    Double,
    Single,
    Guid,
    Binary,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    /// Anything not recognized is kept verbatim so schema generation can
    /// still fall back to a JSON Schema `string`.
    Other(String),
}

impl EdmType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim_start_matches("Edm.") {
            "String" => EdmType::String,
            "Boolean" => EdmType::Boolean,
            "Byte" => EdmType::Byte,
            "SByte" => EdmType::SByte,
            "Int16" => EdmType::Int16,
            "Int32" => EdmType::Int32,
            "Int64" => EdmType::Int64,
            "Decimal" => EdmType::Decimal,
            "Double" => EdmType::Double,
            "Single" => EdmType::Single,
            "Guid" => EdmType::Guid,
            "Binary" => EdmType::Binary,
            "DateTime" => EdmType::DateTime,
            "DateTimeOffset" => EdmType::DateTimeOffset,
            "Date" => EdmType::Date,
            "Time" | "TimeOfDay" => EdmType::Time,
            other => EdmType::Other(other.to_string()),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, EdmType::Byte | EdmType::SByte | EdmType::Int16 | EdmType::Int32 | EdmType::Int64)
    }

    pub fn is_decimal(&self) -> bool {
        matches!(self, EdmType::Decimal | EdmType::Double | EdmType::Single)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, EdmType::DateTime | EdmType::DateTimeOffset | EdmType::Date | EdmType::Time)
    }
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub edm_type: EdmType,
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone)]
pub struct NavigationProperty {
    pub name: String,
    pub target_entity_set: String,
    pub cardinality: Cardinality,
}

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub keys: Vec<String>,
    pub properties: Vec<Property>,
    pub navigation_properties: Vec<NavigationProperty>,
}

impl EntityType {
    pub fn find_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn key_properties(&self) -> Vec<&Property> {
        self.keys
            .iter()
            .filter_map(|k| self.find_property(k))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntitySetCapabilities {
    pub readable: bool,
    pub creatable: bool,
    pub updatable: bool,
    pub deletable: bool,
    pub searchable: bool,
}

#[derive(Debug, Clone)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: EntityType,
    pub capabilities: EntitySetCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVerb {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: String,
    pub edm_type: EdmType,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionReturnShape {
    Scalar,
    Entity,
    Collection,
    None,
}

#[derive(Debug, Clone)]
pub struct FunctionImport {
    pub name: String,
    pub http_method: HttpVerb,
    pub parameters: Vec<FunctionParameter>,
    pub return_shape: FunctionReturnShape,
}

/// The fully parsed `$metadata` document for one OData service.
///
/// Immutable after construction; shared via `Arc` by every component that
/// needs schema lookups.
#[derive(Debug, Clone)]
pub struct Schema {
    pub service_root: String,
    pub version: ODataVersion,
    pub namespace: String,
    pub entity_sets: Vec<EntitySet>,
    pub function_imports: Vec<FunctionImport>,
    /// name (as declared) -> index into `entity_sets`.
    by_name: HashMap<String, usize>,
    /// lowercased name -> name (as declared), used only to produce
    /// "did you mean" suggestions in error messages.
    by_lowercase: HashMap<String, String>,
    function_by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new(
        service_root: String,
        version: ODataVersion,
        namespace: String,
        entity_sets: Vec<EntitySet>,
        function_imports: Vec<FunctionImport>,
    ) -> Self {
        let mut by_name = HashMap::with_capacity(entity_sets.len());
        let mut by_lowercase = HashMap::with_capacity(entity_sets.len());
        for (i, set) in entity_sets.iter().enumerate() {
            by_name.insert(set.name.clone(), i);
            by_lowercase.insert(set.name.to_lowercase(), set.name.clone());
        }
        let function_by_name = function_imports
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();

        Self {
            service_root,
            version,
            namespace,
            entity_sets,
            function_imports,
            by_name,
            by_lowercase,
            function_by_name,
        }
    }

    pub fn find_entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.by_name.get(name).map(|&i| &self.entity_sets[i])
    }

    pub fn find_function(&self, name: &str) -> Option<&FunctionImport> {
        self.function_by_name.get(name).map(|&i| &self.function_imports[i])
    }

    /// Best-effort suggestion for a misspelled entity set name, used only to
    /// enrich `InvalidParams` error messages.
    pub fn suggest_entity_set(&self, name: &str) -> Option<&str> {
        self.by_lowercase.get(&name.to_lowercase()).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entity_set(name: &str) -> EntitySet {
        EntitySet {
            name: name.to_string(),
            entity_type: EntityType {
                name: format!("{name}Type"),
                keys: vec!["Id".to_string()],
                properties: vec![Property {
                    name: "Id".to_string(),
                    edm_type: EdmType::Int32,
                    nullable: false,
                    max_length: None,
                    precision: None,
                    scale: None,
                }],
                navigation_properties: vec![],
            },
            capabilities: EntitySetCapabilities {
                readable: true,
                creatable: true,
                updatable: true,
                deletable: true,
                searchable: false,
            },
        }
    }

    #[test]
    fn edm_type_parse_strips_namespace_prefix() {
        assert_eq!(EdmType::parse("Edm.Int32"), EdmType::Int32);
        assert_eq!(EdmType::parse("Edm.String"), EdmType::String);
        assert!(matches!(EdmType::parse("Edm.Stream"), EdmType::Other(_)));
    }

    #[test]
    fn lookup_is_case_sensitive_with_lowercase_suggestion() {
        let schema = Schema::new(
            "https://example.org/svc".to_string(),
            ODataVersion::V2,
            "ns".to_string(),
            vec![sample_entity_set("Products")],
            vec![],
        );

        assert!(schema.find_entity_set("products").is_none());
        assert!(schema.find_entity_set("Products").is_some());
        assert_eq!(schema.suggest_entity_set("products"), Some("Products"));
    }

    #[test]
    fn key_properties_resolve_in_declared_order() {
        let mut set = sample_entity_set("OrderDetails");
        set.entity_type.keys = vec!["OrderID".to_string(), "ProductID".to_string()];
        set.entity_type.properties.push(Property {
            name: "OrderID".to_string(),
            edm_type: EdmType::Int32,
            nullable: false,
            max_length: None,
            precision: None,
            scale: None,
        });
        set.entity_type.properties.push(Property {
            name: "ProductID".to_string(),
            edm_type: EdmType::Int32,
            nullable: false,
            max_length: None,
            precision: None,
            scale: None,
        });

        let keys = set.entity_type.key_properties();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].name, "OrderID");
        assert_eq!(keys[1].name, "ProductID");
    }
}
