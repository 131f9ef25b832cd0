//! Fetches and parses an OData `$metadata` (EDMX) document into a [`Schema`].

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::AppError;
use crate::http_client::ODataClient;
use crate::schema::{
    Cardinality, EdmType, EntitySet, EntitySetCapabilities, EntityType, FunctionImport,
    FunctionParameter, FunctionReturnShape, HttpVerb, NavigationProperty, ODataVersion, Property,
    Schema,
};

/// Default per-request timeout for the metadata fetch (overridable via
/// `RuntimeConfig`).
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 30;

/// Fetches `<service_root>/$metadata` and parses it into a [`Schema`].
pub async fn load(client: &dyn ODataClient, service_root: &str) -> Result<Schema, AppError> {
    let root = service_root.trim_end_matches('/');
    let url = format!("{root}/$metadata");
    let body = client
        .get_metadata(&url)
        .await
        .map_err(|e| AppError::Network(e.to_string()))?;

    parse(root, &body)
}

/// Raw building block for an `EntityType` while its `<Property>` /
/// `<NavigationProperty>` children are still streaming in.
struct EntityTypeBuilder {
    name: String,
    keys: Vec<String>,
    properties: Vec<Property>,
    navigation_properties: Vec<NavigationPropertyRaw>,
}

/// A navigation property's target is declared via an `Association`
/// reference (v2) that is resolved only once every `AssociationSet` has been
/// seen, so we keep the raw association name until a second pass.
struct NavigationPropertyRaw {
    name: String,
    relationship: String,
    from_role: String,
    to_role: String,
}

struct EntitySetRaw {
    name: String,
    entity_type_name: String,
    sap_creatable: Option<bool>,
    sap_updatable: Option<bool>,
    sap_deletable: Option<bool>,
    sap_searchable: Option<bool>,
}

/// Parses an EDMX document (the body of a `$metadata` response) into a
/// [`Schema`]. Uses a streaming reader since real SAP gateways routinely
/// return metadata documents in the hundreds of kilobytes.
pub fn parse(service_root: &str, xml: &str) -> Result<Schema, AppError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut namespace = String::new();
    let mut version = ODataVersion::V4;
    let mut entity_types: HashMap<String, EntityTypeBuilder> = HashMap::new();
    let mut entity_sets_raw: Vec<EntitySetRaw> = Vec::new();
    let mut function_imports: Vec<FunctionImport> = Vec::new();
    // association full-name ("Namespace.AssocName") -> [(Role, EntitySet), ...]
    // in declaration order.
    let mut association_sets: HashMap<String, Vec<(String, String)>> = HashMap::new();

    let mut current_entity_type: Option<EntityTypeBuilder> = None;
    let mut current_function: Option<FunctionImport> = None;
    let mut reading_key = false;
    let mut current_association: Option<String> = None;

    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| AppError::MetadataParse(format!("XML error: {e}")))?
        {
            Event::Eof => break,
            Event::Start(e) => {
                handle_start(
                    &e,
                    &mut namespace,
                    &mut version,
                    &mut current_entity_type,
                    &mut current_function,
                    &mut reading_key,
                    &mut entity_sets_raw,
                    &mut association_sets,
                    &mut current_association,
                )?;
            }
            Event::Empty(e) => {
                handle_start(
                    &e,
                    &mut namespace,
                    &mut version,
                    &mut current_entity_type,
                    &mut current_function,
                    &mut reading_key,
                    &mut entity_sets_raw,
                    &mut association_sets,
                    &mut current_association,
                )?;
                handle_end(
                    local_name(&e),
                    &mut current_entity_type,
                    &mut current_function,
                    &mut reading_key,
                    &mut entity_types,
                    &mut function_imports,
                    &mut current_association,
                );
            }
            Event::End(e) => {
                handle_end(
                    e.name().as_ref().to_vec(),
                    &mut current_entity_type,
                    &mut current_function,
                    &mut reading_key,
                    &mut entity_types,
                    &mut function_imports,
                    &mut current_association,
                );
            }
            _ => {}
        }
        buf.clear();
    }

    if namespace.is_empty() {
        return Err(AppError::MetadataParse(
            "no <Schema Namespace=…> element found".to_string(),
        ));
    }

    let mut entity_sets = Vec::with_capacity(entity_sets_raw.len());
    for raw in entity_sets_raw {
        let short_type_name = raw
            .entity_type_name
            .rsplit('.')
            .next()
            .unwrap_or(&raw.entity_type_name)
            .to_string();
        let Some(builder) = entity_types.get(&short_type_name) else {
            tracing::warn!(
                entity_set = %raw.name,
                entity_type = %raw.entity_type_name,
                "entity set references unknown entity type, skipping"
            );
            continue;
        };

        if builder.keys.is_empty() {
            tracing::warn!(
                entity_set = %raw.name,
                "entity type has no declared key, projecting as read-only"
            );
        }

        let navigation_properties = builder
            .navigation_properties
            .iter()
            .filter_map(|nav| {
                let assoc_key = nav.relationship.rsplit('.').next().unwrap_or(&nav.relationship);
                let ends = association_sets.iter().find_map(|(k, ends)| {
                    let short = k.rsplit('.').next().unwrap_or(k);
                    (short == assoc_key).then_some(ends)
                });
                // Prefer the End whose Role matches the navigation's declared
                // ToRole; fall back to whichever End isn't the FromRole.
                let target = ends.and_then(|ends| {
                    ends.iter()
                        .find(|(role, _)| !nav.to_role.is_empty() && role.eq_ignore_ascii_case(&nav.to_role))
                        .or_else(|| ends.iter().find(|(role, _)| !role.eq_ignore_ascii_case(&nav.from_role)))
                        .or_else(|| ends.last())
                        .map(|(_, entity_set)| entity_set.clone())
                });
                target.map(|target_set| NavigationProperty {
                    name: nav.name.clone(),
                    target_entity_set: target_set,
                    cardinality: Cardinality::Many,
                })
            })
            .collect();

        entity_sets.push(EntitySet {
            name: raw.name,
            entity_type: EntityType {
                name: builder.name.clone(),
                keys: builder.keys.clone(),
                properties: builder.properties.clone(),
                navigation_properties,
            },
            capabilities: EntitySetCapabilities {
                readable: true,
                creatable: raw.sap_creatable.unwrap_or(!builder.keys.is_empty()),
                updatable: raw.sap_updatable.unwrap_or(!builder.keys.is_empty()),
                deletable: raw.sap_deletable.unwrap_or(!builder.keys.is_empty()),
                searchable: raw.sap_searchable.unwrap_or(true),
            },
        });
    }

    Ok(Schema::new(
        service_root.to_string(),
        version,
        namespace,
        entity_sets,
        function_imports,
    ))
}

fn local_name(e: &BytesStart<'_>) -> Vec<u8> {
    e.name().as_ref().to_vec()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.as_ref() == name.as_bytes() {
            String::from_utf8(a.value.to_vec()).ok()
        } else {
            None
        }
    })
}

#[allow(clippy::too_many_arguments)]
fn handle_start(
    e: &BytesStart<'_>,
    namespace: &mut String,
    version: &mut ODataVersion,
    current_entity_type: &mut Option<EntityTypeBuilder>,
    current_function: &mut Option<FunctionImport>,
    reading_key: &mut bool,
    entity_sets_raw: &mut Vec<EntitySetRaw>,
    association_sets: &mut HashMap<String, Vec<(String, String)>>,
    current_association: &mut Option<String>,
) -> Result<(), AppError> {
    match tag_name(e).as_str() {
        "Schema" => {
            if let Some(ns) = attr(e, "Namespace") {
                *namespace = ns;
            }
        }
        "DataServices" => {
            if let Some(v) = attr(e, "m:DataServiceVersion").or_else(|| attr(e, "DataServiceVersion")) {
                *version = if v.starts_with('4') { ODataVersion::V4 } else { ODataVersion::V2 };
            }
        }
        "EntityType" => {
            if let Some(name) = attr(e, "Name") {
                *current_entity_type = Some(EntityTypeBuilder {
                    name,
                    keys: Vec::new(),
                    properties: Vec::new(),
                    navigation_properties: Vec::new(),
                });
            }
        }
        "Key" => {
            *reading_key = true;
        }
        "PropertyRef" if *reading_key => {
            if let (Some(builder), Some(name)) = (current_entity_type.as_mut(), attr(e, "Name")) {
                builder.keys.push(name);
            }
        }
        "Property" => {
            if let Some(builder) = current_entity_type.as_mut() {
                if let Some(name) = attr(e, "Name") {
                    let edm_type = attr(e, "Type").map(|t| EdmType::parse(&t)).unwrap_or(EdmType::String);
                    let nullable = attr(e, "Nullable").map(|n| n != "false").unwrap_or(true);
                    let max_length = attr(e, "MaxLength").and_then(|m| m.parse().ok());
                    let precision = attr(e, "Precision").and_then(|p| p.parse().ok());
                    let scale = attr(e, "Scale").and_then(|s| s.parse().ok());
                    builder.properties.push(Property {
                        name,
                        edm_type,
                        nullable,
                        max_length,
                        precision,
                        scale,
                    });
                }
            } else if let Some(func) = current_function.as_mut() {
                // v4 function parameters are <Parameter>, handled below; this
                // branch is unused but kept symmetric for completeness.
                let _ = func;
            }
        }
        "NavigationProperty" => {
            if let Some(builder) = current_entity_type.as_mut() {
                if let Some(name) = attr(e, "Name") {
                    let relationship = attr(e, "Relationship").unwrap_or_default();
                    let to_role = attr(e, "ToRole").unwrap_or_default();
                    let from_role = attr(e, "FromRole").unwrap_or_default();
                    builder.navigation_properties.push(NavigationPropertyRaw {
                        name,
                        relationship,
                        from_role,
                        to_role,
                    });
                }
            }
        }
        "EntitySet" => {
            if let (Some(name), Some(entity_type)) = (attr(e, "Name"), attr(e, "EntityType")) {
                entity_sets_raw.push(EntitySetRaw {
                    name,
                    entity_type_name: entity_type,
                    sap_creatable: attr(e, "sap:creatable").map(|v| v == "true"),
                    sap_updatable: attr(e, "sap:updatable").map(|v| v == "true"),
                    sap_deletable: attr(e, "sap:deletable").map(|v| v == "true"),
                    sap_searchable: attr(e, "sap:searchable").map(|v| v == "true"),
                });
            }
        }
        "AssociationSet" => {
            if let Some(assoc_name) = attr(e, "Association") {
                // v2 AssociationSet carries its <End> children as separate
                // events; each <End Role=.. EntitySet=..> is attributed to
                // the association set currently open.
                association_sets.entry(assoc_name.clone()).or_default();
                *current_association = Some(assoc_name);
            }
        }
        "End" => {
            if let (Some(role), Some(entity_set)) = (attr(e, "Role"), attr(e, "EntitySet")) {
                if let Some(assoc_name) = current_association.as_ref() {
                    if let Some(ends) = association_sets.get_mut(assoc_name) {
                        ends.push((role, entity_set));
                    }
                }
            }
        }
        "FunctionImport" => {
            if let Some(name) = attr(e, "Name") {
                let http_method = attr(e, "m:HttpMethod")
                    .or_else(|| attr(e, "HttpMethod"))
                    .map(|m| if m.eq_ignore_ascii_case("POST") { HttpVerb::Post } else { HttpVerb::Get })
                    .unwrap_or(HttpVerb::Get);
                let return_shape = match attr(e, "ReturnType") {
                    None => FunctionReturnShape::None,
                    Some(rt) if rt.starts_with("Collection(") => FunctionReturnShape::Collection,
                    Some(rt) if rt.starts_with("Edm.") => FunctionReturnShape::Scalar,
                    Some(_) => FunctionReturnShape::Entity,
                };
                *current_function = Some(FunctionImport {
                    name,
                    http_method,
                    parameters: Vec::new(),
                    return_shape,
                });
            }
        }
        "Parameter" => {
            if let Some(func) = current_function.as_mut() {
                if let Some(name) = attr(e, "Name") {
                    let edm_type = attr(e, "Type").map(|t| EdmType::parse(&t)).unwrap_or(EdmType::String);
                    let nullable = attr(e, "Nullable").map(|n| n != "false").unwrap_or(true);
                    func.parameters.push(FunctionParameter { name, edm_type, nullable });
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_end(
    name: Vec<u8>,
    current_entity_type: &mut Option<EntityTypeBuilder>,
    current_function: &mut Option<FunctionImport>,
    reading_key: &mut bool,
    entity_types: &mut HashMap<String, EntityTypeBuilder>,
    function_imports: &mut Vec<FunctionImport>,
    current_association: &mut Option<String>,
) {
    match std::str::from_utf8(&name).unwrap_or("") {
        "EntityType" => {
            if let Some(builder) = current_entity_type.take() {
                entity_types.insert(builder.name.clone(), builder);
            }
        }
        "Key" => *reading_key = false,
        "FunctionImport" => {
            if let Some(func) = current_function.take() {
                function_imports.push(func);
            }
        }
        "AssociationSet" => {
            *current_association = None;
        }
        _ => {}
    }
}

fn tag_name(e: &BytesStart<'_>) -> String {
    let raw = e.name().0.to_vec();
    let s = std::str::from_utf8(&raw).unwrap_or("").to_string();
    s.rsplit(':').next().unwrap_or(&s).to_string()
}
