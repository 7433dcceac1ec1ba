use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tracing::debug;

use super::{AuthBackend, AuthResponse, AuthUser, LoginCredentials, RegisterCredentials};
use crate::id::new_id;
use crate::{Error, Result};

const TOKEN_LIFETIME: time::Duration = time::Duration::hours(24);

struct StoredUser {
   password: String,
   user: AuthUser,
}

/// In-memory auth backend for development and tests.
///
/// Accounts live only as long as the backend. Tokens look like
/// `mock.<user id>.token.<unix millis>` and expire after 24 hours.
#[derive(Default)]
pub struct MockAuthBackend {
   users: Mutex<HashMap<String, StoredUser>>,
   delay: Duration,
}

impl MockAuthBackend {
   pub fn new() -> Self {
      Self::default()
   }

   /// Simulated network latency applied to every call.
   pub fn with_delay(mut self, delay: Duration) -> Self {
      self.delay = delay;
      self
   }

   async fn simulate_delay(&self) {
      if !self.delay.is_zero() {
         tokio::time::sleep(self.delay).await;
      }
   }

   fn issue(user: AuthUser) -> AuthResponse {
      let now = OffsetDateTime::now_utc();
      let millis = now.unix_timestamp_nanos() / 1_000_000;
      AuthResponse {
         token: format!("mock.{}.token.{millis}", user.id),
         expires_at: Some(now + TOKEN_LIFETIME),
         user,
      }
   }

   fn user_for_token(&self, token: &str) -> Result<AuthUser> {
      let user_id = token
         .split('.')
         .nth(1)
         .ok_or_else(|| Error::Authentication("Invalid token".into()))?;
      self
         .users
         .lock()
         .values()
         .find(|stored| stored.user.id == user_id)
         .map(|stored| stored.user.clone())
         .ok_or_else(|| Error::Authentication("Invalid token".into()))
   }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
   async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse> {
      self.simulate_delay().await;

      let users = self.users.lock();
      match users.get(&credentials.email) {
         Some(stored) if stored.password == credentials.password => Ok(Self::issue(stored.user.clone())),
         _ => Err(Error::Authentication("Invalid email or password".into())),
      }
   }

   async fn register(&self, credentials: &RegisterCredentials) -> Result<AuthResponse> {
      self.simulate_delay().await;

      let mut users = self.users.lock();
      if users.contains_key(&credentials.email) {
         return Err(Error::Authentication("Email already registered".into()));
      }

      let user = AuthUser {
         id: new_id(),
         email: credentials.email.clone(),
         username: Some(credentials.username.clone()),
      };
      users.insert(
         credentials.email.clone(),
         StoredUser {
            password: credentials.password.clone(),
            user: user.clone(),
         },
      );
      debug!(user_id = %user.id, "Registered mock user");
      Ok(Self::issue(user))
   }

   async fn logout(&self, _token: Option<&str>) -> Result<()> {
      self.simulate_delay().await;
      Ok(())
   }

   async fn refresh_token(&self, token: &str) -> Result<AuthResponse> {
      self.simulate_delay().await;
      let user = self.user_for_token(token)?;
      Ok(Self::issue(user))
   }

   async fn current_user(&self, token: &str) -> Result<AuthUser> {
      self.simulate_delay().await;
      self.user_for_token(token)
   }
}
