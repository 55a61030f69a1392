//! HTTP plumbing shared by every operation.
//!
//! This module builds the transport, turns a [`RequestSpec`] into a
//! `reqwest::Request` and defines the [`Transport`] seam that executes it.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Url};
use serde::Serialize;

use crate::client::ClientError;
use crate::multipart::MultipartForm;
use crate::options::{ClientConfig, TransportOptions};

const APPLICATION_JSON: &str = "application/json";

/// Executes a fully built request and returns the live response.
///
/// The response body is left untouched so the caller decides whether to
/// buffer it or read it as a stream. Status codes are not inspected here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<reqwest::Response, reqwest::Error>;
}

#[async_trait]
impl Transport for Client {
    async fn execute(&self, request: Request) -> Result<reqwest::Response, reqwest::Error> {
        Client::execute(self, request).await
    }
}

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
///
/// # Example
/// ```ignore
/// let client = build_http_client(&transport_options)?;
/// ```
pub fn build_http_client(options: &TransportOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(proxy_url) = &options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Body of an outbound request.
#[derive(Debug)]
pub enum RequestBody<'a, B: ?Sized> {
    Empty,
    Json(&'a B),
    Multipart(MultipartForm),
}

/// Everything needed to build one outbound request. Created per call.
#[derive(Debug)]
pub struct RequestSpec<'a, B: ?Sized = ()> {
    pub method: Method,
    /// Path relative to the base URL, query string included
    pub path: String,
    pub api_key: &'a str,
    pub body: RequestBody<'a, B>,
    /// Per-request headers; these win over every default
    pub headers: HashMap<String, String>,
}

impl<'a> RequestSpec<'a, ()> {
    /// GET request without a body.
    pub fn get(path: impl Into<String>, api_key: &'a str) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            api_key,
            body: RequestBody::Empty,
            headers: HashMap::new(),
        }
    }

    /// POST request carrying a multipart form.
    pub fn post_form(path: impl Into<String>, api_key: &'a str, form: MultipartForm) -> Self {
        let mut headers = HashMap::new();
        headers.insert(CONTENT_TYPE.as_str().to_string(), form.content_type());
        Self {
            method: Method::POST,
            path: path.into(),
            api_key,
            body: RequestBody::Multipart(form),
            headers,
        }
    }
}

impl<'a, B: Serialize + ?Sized> RequestSpec<'a, B> {
    /// POST request carrying a JSON body.
    pub fn post_json(path: impl Into<String>, api_key: &'a str, body: &'a B) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            api_key,
            body: RequestBody::Json(body),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Turn a request spec into a `reqwest::Request`. No I/O happens here.
pub fn build_request<B>(config: &ClientConfig, spec: RequestSpec<'_, B>) -> Result<Request, ClientError>
where
    B: Serialize + ?Sized,
{
    let raw_url = format!("{}{}", config.base_url.trim_end_matches('/'), spec.path);
    let url = Url::parse(&raw_url).map_err(|e| ClientError::Config(format!("invalid URL {raw_url:?}: {e}")))?;

    let content_type = spec
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()))
        .map(|(_, v)| v.as_str())
        .unwrap_or(APPLICATION_JSON);

    let body: Option<Vec<u8>> = match spec.body {
        RequestBody::Empty => None,
        RequestBody::Json(value) if content_type.starts_with(APPLICATION_JSON) => Some(
            serde_json::to_vec(value).map_err(|e| ClientError::Serialization(e.to_string()))?,
        ),
        RequestBody::Json(_) => {
            return Err(ClientError::Serialization(format!(
                "cannot encode a JSON body as {content_type}"
            )))
        }
        RequestBody::Multipart(form) => Some(form.finish().to_vec()),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", spec.api_key))
            .map_err(|_| ClientError::Config("Invalid API key".to_string()))?,
    );
    if spec.method == Method::POST {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }
    add_extra_headers(&mut headers, &config.extra_headers)?;
    add_extra_headers(&mut headers, &spec.headers)?;

    let mut request = Request::new(spec.method, url);
    *request.headers_mut() = headers;
    if let Some(body) = body {
        *request.body_mut() = Some(body.into());
    }
    Ok(request)
}

/// Merge extra headers into `headers`, replacing values already present.
pub fn add_extra_headers(
    headers: &mut HeaderMap,
    extra_headers: &HashMap<String, String>,
) -> Result<(), ClientError> {
    for (key, value) in extra_headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::Config(format!("invalid header name {key:?}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ClientError::Config(format!("invalid value for header {key:?}")))?;
        headers.insert(name, value);
    }
    Ok(())
}

/// Percent-encode `id` so it stays a single path segment.
///
/// `/`, `?` and `#` are escaped; the result can never address another endpoint.
pub fn path_segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Encode a struct as a query string using its serde field names.
pub fn encode_query<Q: Serialize + ?Sized>(params: &Q) -> Result<String, ClientError> {
    serde_urlencoded::to_string(params).map_err(|e| ClientError::Serialization(e.to_string()))
}
