//! The pluggable authenticated-HTTP-request contract (§6) and its
//! `reqwest`-backed implementation.
//!
//! The core never talks to `reqwest` directly outside this module — the
//! [`ODataClient`] trait is what the Metadata Loader and Tool Dispatcher
//! depend on, so a mock implementation can stand in for tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::CredentialSupplier;

/// HTTP verbs the dispatcher issues against an OData service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Merge,
    Delete,
    Head,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            // HTTP has no native MERGE verb; OData v2 servers recognize the
            // literal extension method `MERGE`.
            HttpMethod::Merge => reqwest::Method::from_bytes(b"MERGE").expect("valid verb"),
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

/// A fully-formed outbound request.
pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    pub url: &'a str,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

/// The response shape every `ODataClient` call returns.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Authenticated request API consumed by the Metadata Loader and Tool
/// Dispatcher. Out of scope per the spec except at this contract surface —
/// this crate supplies one concrete implementation ([`ReqwestClient`]).
#[async_trait]
pub trait ODataClient: Send + Sync {
    async fn send(&self, request: HttpRequest<'_>) -> Result<HttpResponse, reqwest::Error>;

    /// Convenience used by the Metadata Loader: a GET with
    /// `Accept: application/xml`, returning the body as text.
    async fn get_metadata(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self
            .send(HttpRequest {
                method: HttpMethod::Get,
                url,
                headers: vec![("Accept".to_string(), "application/xml".to_string())],
                body: None,
            })
            .await?;
        Ok(response.body_str())
    }
}

/// `reqwest`-backed implementation, holding a cookie-jar-enabled client and
/// the resolved credential headers/cookies applied to every request.
pub struct ReqwestClient {
    client: reqwest::Client,
    credential_headers: Vec<(String, String)>,
}

impl ReqwestClient {
    pub fn new(
        credentials: &dyn CredentialSupplier,
        data_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let resolved = credentials.resolve();
        let mut headers = resolved.headers;
        if !resolved.cookies.is_empty() {
            let cookie_header = resolved
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_string(), cookie_header));
        }

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(data_timeout)
            .build()?;

        Ok(Self {
            client,
            credential_headers: headers,
        })
    }
}

#[async_trait]
impl ODataClient for ReqwestClient {
    async fn send(&self, request: HttpRequest<'_>) -> Result<HttpResponse, reqwest::Error> {
        let mut builder = self.client.request(request.method.as_reqwest(), request.url);
        for (name, value) in &self.credential_headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status, headers, body })
    }
}
