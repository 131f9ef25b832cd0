//! End-to-end coverage against a mocked OData service: `$metadata` parsing,
//! tool generation, and dispatch all run through a real HTTP round trip.
//!
//! Run with: `cargo test --test odata_integration`

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use odata_mcp_bridge::error::AppError;

use odata_mcp_bridge::config::RuntimeConfig;
use odata_mcp_bridge::credentials::NoCredentials;
use odata_mcp_bridge::dispatcher::{self, ServiceContext};
use odata_mcp_bridge::http_client::{ODataClient, ReqwestClient};
use odata_mcp_bridge::metadata;
use odata_mcp_bridge::tools;

const METADATA_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="1.0" xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx">
  <edmx:DataServices m:DataServiceVersion="2.0" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
    <Schema Namespace="TestModel" xmlns="http://schemas.microsoft.com/ado/2008/09/edm">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ProductID"/></Key>
        <Property Name="ProductID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="ProductName" Type="Edm.String" Nullable="true"/>
      </EntityType>
      <EntityContainer Name="TestEntities">
        <EntitySet Name="Products" EntityType="TestModel.Product"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

fn test_config(service_root: &str) -> Arc<RuntimeConfig> {
    let args = odata_mcp_bridge::config::Args {
        service: Some(service_root.to_string()),
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
    };
    Arc::new(RuntimeConfig::from_args(&args).expect("valid config"))
}

fn test_config_lazy_read_only(service_root: &str) -> Arc<RuntimeConfig> {
    let args = odata_mcp_bridge::config::Args {
        service: Some(service_root.to_string()),
        service_positional: None,
        user: None,
        password: None,
        cookie_string: None,
        cookie_file: None,
        read_only: true,
        lazy_metadata: true,
        lazy_threshold: 0,
        operations: None,
        verbose: false,
    };
    Arc::new(RuntimeConfig::from_args(&args).expect("valid config"))
}

async fn build_context_with(config: Arc<RuntimeConfig>) -> Arc<ServiceContext> {
    let metadata_client =
        ReqwestClient::new(&NoCredentials, config.metadata_timeout).expect("http client builds");
    let schema = metadata::load(&metadata_client as &dyn ODataClient, &config.service_root)
        .await
        .expect("metadata parses");
    let generated_tools = tools::generate_tools(&schema, &config);
    Arc::new(
        ServiceContext::new(Arc::new(schema), config, &NoCredentials, generated_tools)
            .expect("service context builds"),
    )
}

async fn build_context(server: &MockServer) -> Arc<ServiceContext> {
    build_context_with(test_config(&server.uri())).await
}

#[tokio::test]
async fn loads_metadata_and_generates_entity_tools() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let names: Vec<&str> = ctx.tools.iter().map(|t| t.tool.name.as_ref()).collect();
    assert!(names.iter().any(|n| n.contains("products") || n.contains("Products")));
}

#[tokio::test]
async fn filter_entities_round_trips_through_dispatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Products"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "d": {
                "results": [
                    { "ProductID": 1, "ProductName": "Widget" },
                    { "ProductID": 2, "ProductName": "Gadget" },
                ]
            }
        })))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let tool_name = ctx
        .tools
        .iter()
        .find(|t| t.tool.name.to_lowercase().contains("products") && t.tool.name.to_lowercase().contains("filter"))
        .map(|t| t.tool.name.to_string())
        .unwrap_or_else(|| "odata_filter".to_string());

    let mut args = serde_json::Map::new();
    if tool_name == "odata_filter" {
        args.insert("entity_set".to_string(), json!("Products"));
    }

    let result = dispatcher::dispatch(&ctx, &tool_name, Some(args)).await.expect("dispatch succeeds");
    let text = result.content[0].as_text().expect("text content").text.clone();
    let body: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(body["value"].as_array().map(|a| a.len()), Some(2));
}

#[tokio::test]
async fn get_entity_by_key_returns_single_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Products(ProductID=1)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "d": { "ProductID": 1, "ProductName": "Widget" }
        })))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let tool_name = ctx
        .tools
        .iter()
        .find(|t| t.tool.name.to_lowercase().contains("products") && t.tool.name.to_lowercase().contains("get"))
        .map(|t| t.tool.name.to_string())
        .unwrap_or_else(|| "odata_get".to_string());

    let mut args = serde_json::Map::new();
    if tool_name == "odata_get" {
        args.insert("entity_set".to_string(), json!("Products"));
        args.insert("key".to_string(), json!({ "ProductID": 1 }));
    } else {
        args.insert("ProductID".to_string(), json!(1));
    }

    let result = dispatcher::dispatch(&ctx, &tool_name, Some(args)).await.expect("dispatch succeeds");
    let text = result.content[0].as_text().expect("text content").text.clone();
    let body: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(body["ProductName"], "Widget");
}

#[tokio::test]
async fn unknown_tool_name_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let err = dispatcher::dispatch(&ctx, "does_not_exist", None).await.unwrap_err();
    assert!(matches!(err, AppError::ToolNotFound(_)));
}

#[tokio::test]
async fn create_entity_missing_required_arg_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let tool_name = ctx
        .tools
        .iter()
        .find(|t| t.tool.name.to_lowercase().contains("products") && t.tool.name.to_lowercase().contains("create"))
        .map(|t| t.tool.name.to_string())
        .unwrap_or_else(|| "create_entity".to_string());

    // Omit the required entity_set/entity arguments entirely.
    let err = dispatcher::dispatch(&ctx, &tool_name, Some(serde_json::Map::new()))
        .await
        .unwrap_err();
    match err {
        AppError::InvalidParams(msg) => assert!(msg.to_lowercase().contains("missing") || msg.to_lowercase().contains("entity")),
        other => panic!("expected InvalidParams, got {other:?}"),
    }
}

#[tokio::test]
async fn write_retries_once_on_csrf_required_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).insert_header("x-csrf-token", "tok-1"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Products"))
        .and(header("x-csrf-token", "tok-1"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-csrf-token", "Required")
                .set_body_string(""),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Products"))
        .and(header("x-csrf-token", "tok-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "d": { "ProductID": 9, "ProductName": "Sprocket" }
        })))
        .mount(&server)
        .await;

    let ctx = build_context(&server).await;
    let tool_name = ctx
        .tools
        .iter()
        .find(|t| t.tool.name.to_lowercase().contains("products") && t.tool.name.to_lowercase().contains("create"))
        .map(|t| t.tool.name.to_string())
        .unwrap_or_else(|| "create_entity".to_string());

    let mut args = serde_json::Map::new();
    if tool_name == "create_entity" {
        args.insert("entity_set".to_string(), json!("Products"));
        args.insert("data".to_string(), json!({ "ProductName": "Sprocket" }));
    } else {
        args.insert("data".to_string(), json!({ "ProductName": "Sprocket" }));
    }

    let result = dispatcher::dispatch(&ctx, &tool_name, Some(args)).await.expect("dispatch succeeds after csrf retry");
    let text = result.content[0].as_text().expect("text content").text.clone();
    let body: serde_json::Value = serde_json::from_str(&text).expect("valid json");
    assert_eq!(body["ProductName"], "Sprocket");
}

#[tokio::test]
async fn lazy_mode_read_only_refuses_write_tool_instead_of_omitting_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/$metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_string(METADATA_XML))
        .mount(&server)
        .await;

    let ctx = build_context_with(test_config_lazy_read_only(&server.uri())).await;

    // The tool stays listed even though the server is read-only...
    assert!(ctx.tools.iter().any(|t| t.tool.name == "create_entity"));

    // ...but dispatching it is refused, not treated as unknown.
    let mut args = serde_json::Map::new();
    args.insert("entity_set".to_string(), json!("Products"));
    args.insert("data".to_string(), json!({ "ProductName": "Sprocket" }));
    let err = dispatcher::dispatch(&ctx, "create_entity", Some(args)).await.unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(_)));
}
