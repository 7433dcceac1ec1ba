use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::{AuthBackend, AuthResponse, AuthUser, LoginCredentials, RegisterCredentials};
use crate::config::SyncConfig;
use crate::connector::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use crate::{Error, Result};

/// Error body returned by the backend: `{"error": "...", "message": "..."}`.
#[derive(Deserialize)]
struct ApiErrorResponse {
   error: String,
   message: Option<String>,
}

/// Auth backend speaking to `{backend}/api/auth/*`.
pub struct HttpAuthBackend<C> {
   config: SyncConfig,
   client: C,
}

impl<C: HttpClient> HttpAuthBackend<C> {
   pub fn new(config: SyncConfig, client: C) -> Self {
      Self { config, client }
   }

   async fn call(
      &self,
      method: HttpMethod,
      action: &str,
      token: Option<&str>,
      body: Option<serde_json::Value>,
   ) -> Result<HttpResponse> {
      let url = self.config.backend_endpoint(&["api", "auth", action])?;
      let mut request = HttpRequest::new(method, url).with_bearer(token.map(str::to_string));
      if let Some(body) = body {
         request = request.with_json(body);
      }

      let response = self.client.send(request).await?;
      if response.is_success() {
         return Ok(response);
      }

      let reason = match serde_json::from_str::<ApiErrorResponse>(&response.body) {
         Ok(api) => api.message.unwrap_or(api.error),
         Err(_) => format!("HTTP {}", response.status),
      };
      warn!(action, status = response.status, "Auth request rejected");
      Err(Error::Authentication(reason))
   }

   fn parse<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
      serde_json::from_str(&response.body)
         .map_err(|e| Error::Authentication(format!("invalid auth response: {e}")))
   }

   async fn session_call(
      &self,
      action: &str,
      token: Option<&str>,
      body: Option<serde_json::Value>,
   ) -> Result<AuthResponse> {
      let response = self.call(HttpMethod::Post, action, token, body).await?;
      let auth: AuthResponse = Self::parse(&response)?;
      auth.validate()?;
      Ok(auth)
   }
}

#[async_trait]
impl<C: HttpClient> AuthBackend for HttpAuthBackend<C> {
   async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse> {
      self
         .session_call("login", None, Some(serde_json::to_value(credentials)?))
         .await
   }

   async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthResponse> {
      self
         .session_call("register", None, Some(serde_json::to_value(credentials)?))
         .await
   }

   async fn logout(&self, token: Option<&str>) -> Result<()> {
      self.call(HttpMethod::Post, "logout", token, None).await?;
      Ok(())
   }

   async fn refresh_token(&self, token: &str) -> Result<AuthResponse> {
      self.session_call("refresh", Some(token), None).await
   }

   async fn current_user(&self, token: &str) -> Result<AuthUser> {
      let response = self.call(HttpMethod::Get, "me", Some(token), None).await?;
      Self::parse(&response)
   }
}
