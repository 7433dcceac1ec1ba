//! User authentication.
//!
//! [`AuthBackend`] is the seam between the app and whatever issues user
//! tokens. [`MockAuthBackend`] keeps accounts in memory; [`HttpAuthBackend`]
//! talks to the real backend. [`AuthService`] validates forms, calls the
//! backend and keeps the signed-in session in an [`AuthSession`] that the
//! upload bridge reads its bearer token from. A session built with a
//! [`TokenStorage`] survives restarts.

mod http;
mod mock;
mod storage;
mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::{Error, Result};

pub use http::HttpAuthBackend;
pub use mock::MockAuthBackend;
pub use storage::{FileTokenStorage, TokenStorage};
pub use validation::{LoginCredentials, RegisterCredentials};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
   pub id: String,
   pub email: String,
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
   pub user: AuthUser,
   pub token: String,
   #[serde(default, with = "time::serde::rfc3339::option")]
   pub expires_at: Option<OffsetDateTime>,
}

impl AuthResponse {
   /// Reject responses a backend should never have produced.
   pub fn validate(&self) -> Result<()> {
      if self.token.is_empty() {
         return Err(Error::Authentication("auth response has an empty token".into()));
      }
      if !validation::is_valid_email(&self.user.email) {
         return Err(Error::Authentication(format!(
            "auth response has an invalid email '{}'",
            self.user.email
         )));
      }
      Ok(())
   }

   pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
      self.expires_at.is_some_and(|at| at <= now)
   }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
   async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse>;

   async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthResponse>;

   async fn logout(&self, token: Option<&str>) -> Result<()>;

   async fn refresh_token(&self, token: &str) -> Result<AuthResponse>;

   async fn current_user(&self, token: &str) -> Result<AuthUser>;
}

/// Shared holder of the signed-in session. Clones observe the same session.
///
/// With a [`TokenStorage`] attached, every sign-in is saved and every
/// sign-out erased, and [`restore`](Self::restore) reloads the last session.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
   inner: Arc<RwLock<Option<AuthResponse>>>,
   storage: Option<Arc<dyn TokenStorage>>,
}

impl AuthSession {
   /// In-memory session, forgotten on exit.
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_storage(storage: impl TokenStorage + 'static) -> Self {
      Self {
         inner: Arc::default(),
         storage: Some(Arc::new(storage)),
      }
   }

   pub fn token(&self) -> Option<String> {
      self.inner.read().as_ref().map(|auth| auth.token.clone())
   }

   pub fn user(&self) -> Option<AuthUser> {
      self.inner.read().as_ref().map(|auth| auth.user.clone())
   }

   /// Id of the signed-in user, for scoping queries to them.
   pub fn user_id(&self) -> Option<String> {
      self.inner.read().as_ref().map(|auth| auth.user.id.clone())
   }

   pub fn is_authenticated(&self) -> bool {
      self.inner.read().is_some()
   }

   /// Reload the persisted session. An expired or unreadable one is dropped
   /// and the session stays signed out.
   pub async fn restore(&self) -> Result<Option<AuthUser>> {
      let Some(storage) = &self.storage else {
         return Ok(self.user());
      };

      let stored = match storage.load().await {
         Ok(stored) => stored,
         Err(e) => {
            warn!(error = %e, "Failed to load stored session");
            None
         }
      };
      match stored {
         Some(auth) if auth.is_expired_at(OffsetDateTime::now_utc()) => {
            debug!(user_id = %auth.user.id, "Stored session expired");
            if let Err(e) = storage.clear().await {
               warn!(error = %e, "Failed to erase expired session");
            }
            Ok(None)
         }
         Some(auth) => {
            let user = auth.user.clone();
            info!(user_id = %user.id, "Session restored");
            *self.inner.write() = Some(auth);
            Ok(Some(user))
         }
         None => Ok(None),
      }
   }

   /// Make `auth` the current session, saving it first when storage is
   /// attached. A failed save leaves the session unchanged.
   pub async fn set(&self, auth: AuthResponse) -> Result<()> {
      if let Some(storage) = &self.storage {
         storage.save(&auth).await?;
      }
      *self.inner.write() = Some(auth);
      Ok(())
   }

   /// Sign out locally. Storage errors are logged, never returned.
   pub async fn clear(&self) {
      *self.inner.write() = None;
      if let Some(storage) = &self.storage
         && let Err(e) = storage.clear().await
      {
         warn!(error = %e, "Failed to erase stored session");
      }
   }
}

pub struct AuthService<B> {
   backend: B,
   session: AuthSession,
}

impl<B: AuthBackend> AuthService<B> {
   pub fn new(backend: B) -> Self {
      Self::with_session(backend, AuthSession::new())
   }

   /// Service maintaining an existing session, e.g. one with storage attached.
   pub fn with_session(backend: B, session: AuthSession) -> Self {
      Self { backend, session }
   }

   /// Handle to the session this service maintains.
   pub fn session(&self) -> AuthSession {
      self.session.clone()
   }

   pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthUser> {
      credentials.validate()?;
      let auth = self.backend.login(credentials).await?;
      self.establish(auth).await
   }

   pub async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthUser> {
      credentials.validate()?;
      let auth = self.backend.register(credentials).await?;
      self.establish(auth).await
   }

   /// Sign out. The local session is cleared even when the backend call fails.
   pub async fn logout(&self) -> Result<()> {
      let token = self.session.token();
      let result = self.backend.logout(token.as_deref()).await;
      self.session.clear().await;
      match &result {
         Ok(()) => info!("Signed out"),
         Err(e) => warn!(error = %e, "Backend logout failed, local session cleared anyway"),
      }
      result
   }

   pub async fn refresh(&self) -> Result<AuthUser> {
      let token = self
         .session
         .token()
         .ok_or_else(|| Error::Authentication("not signed in".into()))?;
      let auth = self.backend.refresh_token(&token).await?;
      self.establish(auth).await
   }

   pub async fn current_user(&self) -> Result<AuthUser> {
      let token = self
         .session
         .token()
         .ok_or_else(|| Error::Authentication("not signed in".into()))?;
      self.backend.current_user(&token).await
   }

   async fn establish(&self, auth: AuthResponse) -> Result<AuthUser> {
      auth.validate()?;
      let user = auth.user.clone();
      self.session.set(auth).await?;
      debug!(user_id = %user.id, "Session established");
      Ok(user)
   }
}
