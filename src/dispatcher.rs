//! The Tool Dispatcher (§4.5): resolves a `tools/call` request to an OData
//! operation, builds the URL and payload, runs the CSRF-aware request, and
//! normalizes the result into an MCP tool response.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rmcp::model::{CallToolResult, Content};
use serde_json::{json, Map, Value};

use crate::config::RuntimeConfig;
use crate::credentials::CredentialSupplier;
use crate::csrf::CsrfSlot;
use crate::error::AppError;
use crate::http_client::{HttpMethod, HttpRequest, HttpResponse, ODataClient, ReqwestClient};
use crate::normalizer;
use crate::schema::{EntitySet, EntityType, FunctionImport, ODataVersion, Schema};
use crate::tools::{GeneratedTool, Operation};

/// Everything the dispatcher needs, grouped so a future multi-service
/// bridge could hold a map of these per service without reshaping the
/// core (§9 "Resolved: multi-service binding").
pub struct ServiceContext {
    pub schema: Arc<Schema>,
    pub config: Arc<RuntimeConfig>,
    pub http: Arc<dyn ODataClient>,
    pub csrf: CsrfSlot,
    pub tools: Vec<GeneratedTool>,
    in_flight: AtomicU64,
}

impl ServiceContext {
    pub fn new(
        schema: Arc<Schema>,
        config: Arc<RuntimeConfig>,
        credentials: &dyn CredentialSupplier,
        tools: Vec<GeneratedTool>,
    ) -> Result<Self, AppError> {
        let http = ReqwestClient::new(credentials, config.data_timeout)
            .map_err(|e| AppError::Network(e.to_string()))?;
        Ok(Self {
            schema,
            config,
            http: Arc::new(http),
            csrf: CsrfSlot::new(),
            tools,
            in_flight: AtomicU64::new(0),
        })
    }

    pub fn find_tool(&self, name: &str) -> Option<&GeneratedTool> {
        self.tools.iter().find(|t| t.tool.name == name)
    }

    pub fn list_tools(&self) -> Vec<rmcp::model::Tool> {
        self.tools.iter().map(|t| t.tool.clone()).collect()
    }
}

/// Entry point invoked by the MCP server's `call_tool` handler.
pub async fn dispatch(
    ctx: &ServiceContext,
    name: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<CallToolResult, AppError> {
    ctx.in_flight.fetch_add(1, Ordering::Relaxed);
    let result = dispatch_inner(ctx, name, arguments).await;
    ctx.in_flight.fetch_sub(1, Ordering::Relaxed);
    result
}

async fn dispatch_inner(
    ctx: &ServiceContext,
    name: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<CallToolResult, AppError> {
    // 1. Look up the tool by name.
    let generated = ctx
        .find_tool(name)
        .ok_or_else(|| AppError::ToolNotFound(name.to_string()))?;
    let args = arguments.unwrap_or_default();

    // 2. Validate required arguments declared in the tool's input schema.
    validate_required(&generated.tool, &args)?;

    // 3. Resolve entity_set / function_name target (lazy mode reads these
    // from arguments; eager mode already bound them into the Operation).
    let resolved = resolve_target(ctx, &generated.operation, &args)?;

    // 4. `-o`/`--read-only` enforcement. Eager mode already suppresses
    // disallowed tools at generation time (`tools::eager`); this is the
    // only enforcement lazy mode gets, since its ten tools are always
    // generated regardless of `operations`.
    check_operation_allowed(ctx, &resolved)?;

    execute(ctx, &resolved, &args).await
}

fn validate_required(tool: &rmcp::model::Tool, args: &Map<String, Value>) -> Result<(), AppError> {
    let Some(required) = tool.input_schema.get("required").and_then(|v| v.as_array()) else {
        return Ok(());
    };
    for field in required {
        let Some(field_name) = field.as_str() else { continue };
        if !args.contains_key(field_name) {
            return Err(AppError::InvalidParams(format!(
                "missing required field '{field_name}' for tool '{}'",
                tool.name
            )));
        }
    }
    Ok(())
}

/// What a resolved call actually targets, after lazy mode's
/// `entity_set`/`function_name` indirection has been followed.
enum ResolvedOperation<'a> {
    EntitySet {
        op: EntitySetOp,
        set: &'a EntitySet,
    },
    Function {
        func: &'a FunctionImport,
    },
    ServiceInfo,
    ListFunctions,
    GetEntitySchema {
        set: &'a EntitySet,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum EntitySetOp {
    Filter,
    Count,
    Search,
    Get,
    Create,
    Update,
    Delete,
}

fn resolve_target<'a>(
    ctx: &'a ServiceContext,
    operation: &Operation,
    args: &Map<String, Value>,
) -> Result<ResolvedOperation<'a>, AppError> {
    let lookup_entity_set = |args: &Map<String, Value>| -> Result<&'a EntitySet, AppError> {
        let name = args
            .get("entity_set")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidParams("missing required field 'entity_set'".to_string()))?;
        ctx.schema.find_entity_set(name).ok_or_else(|| {
            let suggestion = ctx
                .schema
                .suggest_entity_set(name)
                .map(|s| format!(" (did you mean {s}?)"))
                .unwrap_or_default();
            AppError::InvalidParams(format!("unknown entity set '{name}'{suggestion}"))
        })
    };
    let lookup_function = |args: &Map<String, Value>| -> Result<&'a FunctionImport, AppError> {
        let name = args
            .get("function_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidParams("missing required field 'function_name'".to_string()))?;
        ctx.schema
            .find_function(name)
            .ok_or_else(|| AppError::InvalidParams(format!("unknown function import '{name}'")))
    };

    match operation {
        Operation::Filter(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Filter,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Count(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Count,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Search(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Search,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Get(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Get,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Create(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Create,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Update(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Update,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::Delete(name) => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Delete,
            set: ctx.schema.find_entity_set(name).expect("generated from schema"),
        }),
        Operation::CallFunction(name) => Ok(ResolvedOperation::Function {
            func: ctx.schema.find_function(name).expect("generated from schema"),
        }),

        Operation::ServiceInfo => Ok(ResolvedOperation::ServiceInfo),
        Operation::ListFunctions => Ok(ResolvedOperation::ListFunctions),
        Operation::GetEntitySchema => Ok(ResolvedOperation::GetEntitySchema { set: lookup_entity_set(args)? }),
        Operation::ListEntities => Ok(ResolvedOperation::EntitySet {
            op: if args.contains_key("search") { EntitySetOp::Search } else { EntitySetOp::Filter },
            set: lookup_entity_set(args)?,
        }),
        Operation::CountEntities => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Count,
            set: lookup_entity_set(args)?,
        }),
        Operation::GetEntity => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Get,
            set: lookup_entity_set(args)?,
        }),
        Operation::CreateEntity => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Create,
            set: lookup_entity_set(args)?,
        }),
        Operation::UpdateEntity => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Update,
            set: lookup_entity_set(args)?,
        }),
        Operation::DeleteEntity => Ok(ResolvedOperation::EntitySet {
            op: EntitySetOp::Delete,
            set: lookup_entity_set(args)?,
        }),
        Operation::CallFunctionGeneric => Ok(ResolvedOperation::Function { func: lookup_function(args)? }),
    }
}

/// Checks a resolved operation's CRUD kind against `ctx.config.operations`
/// (which already folds `--read-only` in, per `config::RuntimeConfig`).
/// Non-CRUD operations (service info, schema introspection, function
/// imports) are always allowed here.
fn check_operation_allowed(ctx: &ServiceContext, resolved: &ResolvedOperation<'_>) -> Result<(), AppError> {
    let ResolvedOperation::EntitySet { op, .. } = resolved else {
        return Ok(());
    };
    let ops = ctx.config.operations;
    let allowed = match op {
        EntitySetOp::Filter | EntitySetOp::Count | EntitySetOp::Search | EntitySetOp::Get => ops.read,
        EntitySetOp::Create => ops.create,
        EntitySetOp::Update => ops.update,
        EntitySetOp::Delete => ops.delete,
    };
    if allowed {
        return Ok(());
    }
    Err(AppError::PermissionDenied(format!(
        "{} operations are not permitted by the current -o/--read-only configuration",
        match op {
            EntitySetOp::Filter | EntitySetOp::Count | EntitySetOp::Search | EntitySetOp::Get => "read",
            EntitySetOp::Create => "create",
            EntitySetOp::Update => "update",
            EntitySetOp::Delete => "delete",
        }
    )))
}

async fn execute(
    ctx: &ServiceContext,
    resolved: &ResolvedOperation<'_>,
    args: &Map<String, Value>,
) -> Result<CallToolResult, AppError> {
    match resolved {
        ResolvedOperation::ServiceInfo => Ok(text_result(service_info(&ctx.schema))),
        ResolvedOperation::ListFunctions => Ok(text_result(list_functions(&ctx.schema))),
        ResolvedOperation::GetEntitySchema { set } => Ok(text_result(entity_schema_summary(set))),
        ResolvedOperation::Function { func } => call_function(ctx, func, args).await,
        ResolvedOperation::EntitySet { op, set } => match op {
            EntitySetOp::Filter => filter_entities(ctx, set, args).await,
            EntitySetOp::Count => count_entities(ctx, set, args).await,
            EntitySetOp::Search => search_entities(ctx, set, args).await,
            EntitySetOp::Get => get_entity(ctx, set, args).await,
            EntitySetOp::Create => create_entity(ctx, set, args).await,
            EntitySetOp::Update => update_entity(ctx, set, args).await,
            EntitySetOp::Delete => delete_entity(ctx, set, args).await,
        },
    }
}

fn text_result(value: Value) -> CallToolResult {
    CallToolResult::success(vec![Content::text(value.to_string())])
}

// ---------------------------------------------------------------------
// URL construction (§4.5 step 6)
// ---------------------------------------------------------------------

fn entity_set_url(ctx: &ServiceContext, set: &EntitySet) -> String {
    format!("{}/{}", ctx.schema.service_root, set.name)
}

/// Single key `K=<value>`; composite `K1=<v1>,K2=<v2>`; GUIDs as
/// `guid'...'`; strings URL-encoded with single-quote doubling.
fn key_expr(set: &EntitySet, key_values: &Map<String, Value>) -> Result<String, AppError> {
    let keys = set.entity_type.key_properties();
    if keys.is_empty() {
        return Err(AppError::InvalidParams(format!(
            "entity set '{}' has no declared key",
            set.name
        )));
    }
    let mut parts = Vec::with_capacity(keys.len());
    for key in &keys {
        let value = key_values
            .get(&key.name)
            .ok_or_else(|| AppError::InvalidParams(format!("missing key property '{}'", key.name)))?;
        parts.push(format!("{}={}", key.name, format_key_literal(value, &key.edm_type)));
    }
    Ok(parts.join(","))
}

fn format_key_literal(value: &Value, edm_type: &crate::schema::EdmType) -> String {
    use crate::schema::EdmType;
    match (edm_type, value) {
        (EdmType::Guid, Value::String(s)) => format!("guid'{s}'"),
        (_, Value::String(s)) => format!("'{}'", urlencoding::encode(&s.replace('\'', "''"))),
        (_, Value::Number(n)) => n.to_string(),
        (_, Value::Bool(b)) => b.to_string(),
        (_, other) => format!("'{}'", urlencoding::encode(&other.to_string().replace('\'', "''"))),
    }
}

/// Builds the `$filter`/`$select`/… query string for a read operation.
fn query_options(args: &Map<String, Value>, version: ODataVersion, want_count: bool) -> String {
    let mut parts = Vec::new();
    let mut push = |key: &str, value: String| parts.push(format!("{key}={}", urlencoding::encode(&value)));

    if let Some(filter) = args.get("filter").and_then(|v| v.as_str()) {
        push("$filter", filter.to_string());
    }
    if let Some(select) = args.get("select").and_then(|v| v.as_str()) {
        push("$select", select.to_string());
    }
    if let Some(expand) = args.get("expand").and_then(|v| v.as_str()) {
        push("$expand", expand.to_string());
    }
    if let Some(orderby) = args.get("orderby").and_then(|v| v.as_str()) {
        push("$orderby", orderby.to_string());
    }
    if let Some(top) = args.get("top").and_then(|v| v.as_i64()) {
        push("$top", top.to_string());
    }
    if let Some(skip) = args.get("skip").and_then(|v| v.as_i64()) {
        push("$skip", skip.to_string());
    }
    let count_requested = want_count || args.get("count").and_then(|v| v.as_bool()).unwrap_or(false);
    if count_requested {
        match version {
            ODataVersion::V2 => parts.push("$inlinecount=allpages".to_string()),
            ODataVersion::V4 => parts.push("$count=true".to_string()),
        }
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

fn search_query(args: &Map<String, Value>, version: ODataVersion) -> String {
    let Some(search) = args.get("search").and_then(|v| v.as_str()) else {
        return String::new();
    };
    let mut parts = vec![format!(
        "{}={}",
        if version == ODataVersion::V4 { "$search" } else { "search" },
        urlencoding::encode(search)
    )];
    if let Some(top) = args.get("top").and_then(|v| v.as_i64()) {
        parts.push(format!("$top={top}"));
    }
    format!("?{}", parts.join("&"))
}

// ---------------------------------------------------------------------
// Read operations
// ---------------------------------------------------------------------

async fn filter_entities(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    let want_count = args.get("count").and_then(|v| v.as_bool()).unwrap_or(false);
    let url = format!("{}{}", entity_set_url(ctx, set), query_options(args, ctx.schema.version, want_count));
    let response = get(ctx, &url).await?;
    let body = parse_json_body(&response)?;
    let (value, count) = unwrap_collection(body, ctx.schema.version, want_count);
    let decoded = normalizer::decode_response(value, Some(&set.entity_type))?;
    Ok(text_result(json!({ "value": decoded, "count": count })))
}

async fn search_entities(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    if !set.capabilities.searchable {
        return Err(AppError::InvalidParams(format!("entity set '{}' is not searchable", set.name)));
    }
    let url = format!("{}{}", entity_set_url(ctx, set), search_query(args, ctx.schema.version));
    let response = get(ctx, &url).await?;
    let body = parse_json_body(&response)?;
    let (value, count) = unwrap_collection(body, ctx.schema.version, false);
    let decoded = normalizer::decode_response(value, Some(&set.entity_type))?;
    Ok(text_result(json!({ "value": decoded, "count": count })))
}

async fn count_entities(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    let mut url = format!("{}/$count", entity_set_url(ctx, set));
    if let Some(filter) = args.get("filter").and_then(|v| v.as_str()) {
        url.push_str(&format!("?$filter={}", urlencoding::encode(filter)));
    }
    let response = get(ctx, &url).await?;
    let count: i64 = response.body_str().trim().parse().unwrap_or(0);
    Ok(text_result(json!({ "count": count })))
}

async fn get_entity(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    let key_values = key_value_map(set, args)?;
    let url = format!("{}({})", entity_set_url(ctx, set), key_expr(set, &key_values)?);
    let response = get(ctx, &url).await?;
    let body = parse_json_body(&response)?;
    let entity = unwrap_entity(body, ctx.schema.version);
    let decoded = normalizer::decode_response(entity, Some(&set.entity_type))?;
    Ok(text_result(decoded))
}

/// `get_entity`/lazy tools pass keys nested under `key`; eager tools pass
/// key properties as top-level arguments.
fn key_value_map(set: &EntitySet, args: &Map<String, Value>) -> Result<Map<String, Value>, AppError> {
    if let Some(nested) = args.get("key").and_then(|v| v.as_object()) {
        return Ok(nested.clone());
    }
    let mut map = Map::new();
    for key in set.entity_type.key_properties() {
        if let Some(v) = args.get(&key.name) {
            map.insert(key.name.clone(), v.clone());
        }
    }
    Ok(map)
}

// ---------------------------------------------------------------------
// Write operations (CSRF-aware, §4.5.1)
// ---------------------------------------------------------------------

async fn create_entity(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    if !set.capabilities.creatable {
        return Err(AppError::PermissionDenied(format!("entity set '{}' is not creatable", set.name)));
    }
    let data = args
        .get("data")
        .cloned()
        .ok_or_else(|| AppError::InvalidParams("missing required field 'data'".to_string()))?;
    let encoded = normalizer::encode_request(data, Some(&set.entity_type), ctx.schema.version)?;
    let body = serde_json::to_vec(&encoded).map_err(|e| AppError::Normalization(e.to_string()))?;

    let response = write(ctx, HttpMethod::Post, &entity_set_url(ctx, set), body).await?;
    let response_body = parse_json_body(&response)?;
    let entity = unwrap_entity(response_body, ctx.schema.version);
    let decoded = normalizer::decode_response(entity, Some(&set.entity_type))?;
    Ok(text_result(decoded))
}

async fn update_entity(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    if !set.capabilities.updatable {
        return Err(AppError::PermissionDenied(format!("entity set '{}' is not updatable", set.name)));
    }
    let key_values = key_value_map(set, args)?;
    let data = args
        .get("data")
        .cloned()
        .ok_or_else(|| AppError::InvalidParams("missing required field 'data'".to_string()))?;
    let encoded = normalizer::encode_request(data, Some(&set.entity_type), ctx.schema.version)?;
    let body = serde_json::to_vec(&encoded).map_err(|e| AppError::Normalization(e.to_string()))?;

    let url = format!("{}({})", entity_set_url(ctx, set), key_expr(set, &key_values)?);
    let method = if ctx.schema.version == ODataVersion::V2 { HttpMethod::Merge } else { HttpMethod::Patch };
    write(ctx, method, &url, body).await?;
    Ok(text_result(json!({ "updated": true })))
}

async fn delete_entity(ctx: &ServiceContext, set: &EntitySet, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    if !set.capabilities.deletable {
        return Err(AppError::PermissionDenied(format!("entity set '{}' is not deletable", set.name)));
    }
    let key_values = key_value_map(set, args)?;
    let url = format!("{}({})", entity_set_url(ctx, set), key_expr(set, &key_values)?);
    write(ctx, HttpMethod::Delete, &url, Vec::new()).await?;
    Ok(text_result(json!({ "deleted": true })))
}

async fn call_function(ctx: &ServiceContext, func: &FunctionImport, args: &Map<String, Value>) -> Result<CallToolResult, AppError> {
    let params_map = args
        .get("parameters")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_else(|| args.clone());
    let mut parts = Vec::new();
    for param in &func.parameters {
        if let Some(v) = params_map.get(&param.name) {
            parts.push(format!("{}={}", param.name, format_key_literal(v, &param.edm_type)));
        } else if !param.nullable {
            return Err(AppError::InvalidParams(format!("missing required field '{}'", param.name)));
        }
    }
    let query = if parts.is_empty() { String::new() } else { format!("?{}", parts.join("&")) };
    let url = format!("{}/{}{}", ctx.schema.service_root, func.name, query);

    let response = match func.http_method {
        crate::schema::HttpVerb::Get => get(ctx, &url).await?,
        crate::schema::HttpVerb::Post => write(ctx, HttpMethod::Post, &url, Vec::new()).await?,
    };
    if matches!(func.return_shape, crate::schema::FunctionReturnShape::None) {
        return Ok(text_result(json!({ "ok": true })));
    }
    let body = parse_json_body(&response)?;
    let unwrapped = unwrap_entity(body, ctx.schema.version);
    Ok(text_result(normalizer::decode_response(unwrapped, None)?))
}

// ---------------------------------------------------------------------
// HTTP execution
// ---------------------------------------------------------------------

async fn get(ctx: &ServiceContext, url: &str) -> Result<HttpResponse, AppError> {
    let response = ctx
        .http
        .send(HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: None,
        })
        .await
        .map_err(|e| AppError::Network(e.to_string()))?;
    check_odata_error(&response)?;
    Ok(response)
}

/// CSRF-aware write (§4.5.1): fetches a token if unheld, retries exactly
/// once on a 403/`X-CSRF-Token: Required` response.
async fn write(ctx: &ServiceContext, method: HttpMethod, url: &str, body: Vec<u8>) -> Result<HttpResponse, AppError> {
    let token = ctx.csrf.get_or_fetch(|| fetch_csrf_token(ctx)).await?;
    let response = send_write(ctx, method, url, &body, &token).await?;

    if response.status == 403 && response.header("x-csrf-token").map(|v| v.eq_ignore_ascii_case("required")).unwrap_or(false) {
        ctx.csrf.invalidate().await;
        let retried_token = ctx.csrf.get_or_fetch(|| fetch_csrf_token(ctx)).await?;
        let retried = send_write(ctx, method, url, &body, &retried_token).await?;
        if retried.status == 403 {
            return Err(AppError::Auth {
                message: "CSRF handshake failed twice".to_string(),
                status: Some(retried.status),
            });
        }
        check_odata_error(&retried)?;
        return Ok(retried);
    }

    check_odata_error(&response)?;
    Ok(response)
}

async fn send_write(ctx: &ServiceContext, method: HttpMethod, url: &str, body: &[u8], token: &str) -> Result<HttpResponse, AppError> {
    ctx.http
        .send(HttpRequest {
            method,
            url,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("X-CSRF-Token".to_string(), token.to_string()),
            ],
            body: if body.is_empty() { None } else { Some(body.to_vec()) },
        })
        .await
        .map_err(|e| AppError::Network(e.to_string()))
}

async fn fetch_csrf_token(ctx: &ServiceContext) -> Result<String, AppError> {
    let response = ctx
        .http
        .send(HttpRequest {
            method: HttpMethod::Head,
            url: &ctx.schema.service_root,
            headers: vec![("X-CSRF-Token".to_string(), "Fetch".to_string())],
            body: None,
        })
        .await
        .map_err(|e| AppError::Network(e.to_string()))?;
    let status = response.status;
    response.header("x-csrf-token").map(|s| s.to_string()).ok_or_else(|| AppError::Auth {
        message: "service did not return an X-CSRF-Token".to_string(),
        status: Some(status),
    })
}

fn check_odata_error(response: &HttpResponse) -> Result<(), AppError> {
    if response.status < 400 {
        return Ok(());
    }
    let (code, message) = parse_odata_error(&response.body_str()).unwrap_or_else(|| {
        (None, format!("OData request failed with status {}", response.status))
    });
    Err(AppError::OData { status: response.status, message, code })
}

/// `{ error: { code, message: { value } } }` (v2) or
/// `{ error: { code, message } }` (v4), per §4.5.3.
fn parse_odata_error(body: &str) -> Option<(Option<String>, String)> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let code = error.get("code").and_then(|v| v.as_str()).map(|s| s.to_string());
    let message = error
        .get("message")
        .and_then(|m| m.as_str().map(|s| s.to_string()).or_else(|| m.get("value").and_then(|v| v.as_str()).map(|s| s.to_string())))
        .unwrap_or_else(|| "OData error".to_string());
    Some((code, message))
}

fn parse_json_body(response: &HttpResponse) -> Result<Value, AppError> {
    serde_json::from_slice(&response.body).map_err(|e| AppError::Normalization(format!("response is not valid JSON: {e}")))
}

/// v2 wraps every payload in `{ d: ... }`; v4 does not.
fn unwrap_entity(body: Value, version: ODataVersion) -> Value {
    if version == ODataVersion::V2 {
        body.get("d").cloned().unwrap_or(body)
    } else {
        body
    }
}

/// Normalizes a collection response into `(rows, count)`, handling both
/// v2's `d.results`/`d.__count` and v4's `value`/`@odata.count` (§4.5.2).
fn unwrap_collection(body: Value, version: ODataVersion, want_count: bool) -> (Value, Option<i64>) {
    match version {
        ODataVersion::V2 => {
            let d = body.get("d").cloned().unwrap_or(body);
            let rows = d.get("results").cloned().unwrap_or_else(|| d.clone());
            let count = if want_count {
                d.get("__count").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
            } else {
                None
            };
            (rows, count)
        }
        ODataVersion::V4 => {
            let rows = body.get("value").cloned().unwrap_or(body.clone());
            let count = if want_count { body.get("@odata.count").and_then(|v| v.as_i64()) } else { None };
            (rows, count)
        }
    }
}

// ---------------------------------------------------------------------
// Lazy-mode introspection tools
// ---------------------------------------------------------------------

fn service_info(schema: &Schema) -> Value {
    json!({
        "serviceRoot": schema.service_root,
        "version": match schema.version { ODataVersion::V2 => "v2", ODataVersion::V4 => "v4" },
        "namespace": schema.namespace,
        "entitySets": schema.entity_sets.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
        "functionImports": schema.function_imports.iter().map(|f| f.name.clone()).collect::<Vec<_>>(),
    })
}

fn list_functions(schema: &Schema) -> Value {
    json!({
        "functions": schema.function_imports.iter().map(|f| json!({
            "name": f.name,
            "httpMethod": match f.http_method { crate::schema::HttpVerb::Get => "GET", crate::schema::HttpVerb::Post => "POST" },
            "parameters": f.parameters.iter().map(|p| json!({ "name": p.name, "nullable": p.nullable })).collect::<Vec<_>>(),
        })).collect::<Vec<_>>()
    })
}

fn entity_schema_summary(set: &EntitySet) -> Value {
    let entity_type: &EntityType = &set.entity_type;
    json!({
        "name": set.name,
        "keys": entity_type.keys,
        "properties": entity_type.properties.iter().map(|p| json!({
            "name": p.name,
            "nullable": p.nullable,
        })).collect::<Vec<_>>(),
        "navigationProperties": entity_type.navigation_properties.iter().map(|n| json!({
            "name": n.name,
            "targetEntitySet": n.target_entity_set,
        })).collect::<Vec<_>>(),
        "capabilities": {
            "readable": set.capabilities.readable,
            "creatable": set.capabilities.creatable,
            "updatable": set.capabilities.updatable,
            "deletable": set.capabilities.deletable,
            "searchable": set.capabilities.searchable,
        },
    })
}
