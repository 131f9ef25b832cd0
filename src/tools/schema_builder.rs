//! The input-schema builder shared by the eager and lazy tool-generation
//! strategies (§4.4): JSON Schema Draft-07 objects built from EDM types.

use serde_json::{json, Map, Value};

use crate::schema::{EdmType, EntitySet, EntityType};

/// Maps a primitive EDM type to its JSON Schema fragment.
///
/// string/guid/binary → `string`; int → `integer`; decimal → `number`;
/// boolean → `boolean`; date/datetime → `string` with a `format` hint.
pub fn edm_type_schema(edm_type: &EdmType) -> Value {
    match edm_type {
        EdmType::Boolean => json!({ "type": "boolean" }),
        EdmType::Byte | EdmType::SByte | EdmType::Int16 | EdmType::Int32 | EdmType::Int64 => {
            json!({ "type": "integer" })
        }
        EdmType::Decimal | EdmType::Double | EdmType::Single => json!({ "type": "number" }),
        EdmType::DateTime | EdmType::DateTimeOffset => json!({ "type": "string", "format": "date-time" }),
        EdmType::Date => json!({ "type": "string", "format": "date" }),
        EdmType::Time => json!({ "type": "string", "format": "time" }),
        EdmType::Guid => json!({ "type": "string", "format": "uuid" }),
        EdmType::Binary => json!({ "type": "string", "format": "byte" }),
        EdmType::String | EdmType::Other(_) => json!({ "type": "string" }),
    }
}

/// A JSON Schema `object` builder: properties accumulate in insertion
/// order, required names are tracked separately so nullable properties are
/// never required.
#[derive(Default)]
pub struct ObjectSchemaBuilder {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ObjectSchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &str, schema: Value, required: bool) -> Self {
        self.properties.insert(name.to_string(), schema);
        if required {
            self.required.push(name.to_string());
        }
        self
    }

    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.field(name, json!({ "type": "string", "description": description }), required)
    }

    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.field(name, json!({ "type": "integer", "description": description }), required)
    }

    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.field(name, json!({ "type": "boolean", "description": description }), required)
    }

    pub fn object(self, name: &str, description: &str, required: bool) -> Self {
        self.field(
            name,
            json!({ "type": "object", "description": description, "additionalProperties": true }),
            required,
        )
    }

    pub fn build(self) -> Map<String, Value> {
        let mut root = Map::new();
        root.insert("type".to_string(), json!("object"));
        root.insert("properties".to_string(), Value::Object(self.properties));
        if !self.required.is_empty() {
            root.insert("required".to_string(), json!(self.required));
        }
        root.insert("additionalProperties".to_string(), json!(false));
        root
    }
}

/// The `data` object schema for create/update tools: one property per
/// entity-type property, typed per its EDM type, required only for
/// non-nullable, non-key properties on create.
pub fn entity_data_schema(entity_type: &EntityType, require_non_nullable: bool) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for prop in &entity_type.properties {
        properties.insert(prop.name.clone(), edm_type_schema(&prop.edm_type));
        if require_non_nullable && !prop.nullable && !entity_type.keys.contains(&prop.name) {
            required.push(prop.name.clone());
        }
    }
    let mut root = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": true,
    });
    if !required.is_empty() {
        root.as_object_mut().unwrap().insert("required".to_string(), json!(required));
    }
    root
}

/// Adds one schema property per key of `entity_set`'s entity type, all
/// required — the shape shared by `get_<E>`/`update_<E>`/`delete_<E>` and
/// the lazy `key` object.
pub fn key_properties_schema(entity_set: &EntitySet) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for key in entity_set.entity_type.key_properties() {
        properties.insert(key.name.clone(), edm_type_schema(&key.edm_type));
        required.push(key.name.clone());
    }
    let mut root = Map::new();
    root.insert("type".to_string(), json!("object"));
    root.insert("properties".to_string(), Value::Object(properties));
    root.insert("required".to_string(), json!(required));
    root.insert("additionalProperties".to_string(), json!(false));
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edm_int32_maps_to_json_integer() {
        assert_eq!(edm_type_schema(&EdmType::Int32), json!({ "type": "integer" }));
    }

    #[test]
    fn edm_decimal_maps_to_json_number() {
        assert_eq!(edm_type_schema(&EdmType::Decimal), json!({ "type": "number" }));
    }

    #[test]
    fn object_builder_tracks_required_fields_separately() {
        let schema = ObjectSchemaBuilder::new()
            .string("filter", "OData $filter expression", false)
            .integer("top", "max rows", false)
            .build();
        assert_eq!(schema["type"], "object");
        assert!(schema.get("required").is_none());
    }
}
