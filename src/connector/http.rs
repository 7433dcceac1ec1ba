//! HTTP transport seam.
//!
//! The bridge talks to the backend through [`HttpClient`] so tests can
//! script responses without a server. [`ReqwestClient`] is the production
//! implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value as JsonValue;
use tracing::trace;
use url::Url;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
   Get,
   Post,
   Put,
   Patch,
   Delete,
}

impl HttpMethod {
   pub fn as_str(self) -> &'static str {
      match self {
         HttpMethod::Get => "GET",
         HttpMethod::Post => "POST",
         HttpMethod::Put => "PUT",
         HttpMethod::Patch => "PATCH",
         HttpMethod::Delete => "DELETE",
      }
   }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
   pub method: HttpMethod,
   pub url: Url,
   pub bearer_token: Option<String>,
   pub body: Option<JsonValue>,
}

impl HttpRequest {
   pub fn new(method: HttpMethod, url: Url) -> Self {
      Self {
         method,
         url,
         bearer_token: None,
         body: None,
      }
   }

   pub fn with_bearer(mut self, token: Option<String>) -> Self {
      self.bearer_token = token;
      self
   }

   pub fn with_json(mut self, body: JsonValue) -> Self {
      self.body = Some(body);
      self
   }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
   pub status: u16,
   pub body: String,
}

impl HttpResponse {
   pub fn new(status: u16, body: impl Into<String>) -> Self {
      Self {
         status,
         body: body.into(),
      }
   }

   pub fn is_success(&self) -> bool {
      (200..300).contains(&self.status)
   }
}

/// Sends one request. Transport failures are errors; any HTTP status,
/// including 4xx/5xx, is a response.
#[async_trait]
pub trait HttpClient: Send + Sync {
   async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
   async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
      (**self).send(request).await
   }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
   client: reqwest::Client,
}

impl ReqwestClient {
   pub fn new(timeout: Duration) -> Result<Self> {
      let client = reqwest::Client::builder().timeout(timeout).build()?;
      Ok(Self { client })
   }
}

#[async_trait]
impl HttpClient for ReqwestClient {
   async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
      let method = match request.method {
         HttpMethod::Get => reqwest::Method::GET,
         HttpMethod::Post => reqwest::Method::POST,
         HttpMethod::Put => reqwest::Method::PUT,
         HttpMethod::Patch => reqwest::Method::PATCH,
         HttpMethod::Delete => reqwest::Method::DELETE,
      };
      trace!(method = request.method.as_str(), url = %request.url, "HTTP request");

      let mut builder = self
         .client
         .request(method, request.url)
         .header(CONTENT_TYPE, "application/json");
      if let Some(token) = &request.bearer_token {
         builder = builder.bearer_auth(token);
      }
      if let Some(body) = &request.body {
         builder = builder.json(body);
      }

      let response = builder.send().await?;
      let status = response.status().as_u16();
      let body = response.text().await?;
      Ok(HttpResponse { status, body })
   }
}
