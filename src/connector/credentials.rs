use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::{Error, Result};

/// Sync service credentials. Either complete or not produced at all.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
   pub endpoint: Url,
   pub token: String,
   pub expires_at: Option<OffsetDateTime>,
}

impl fmt::Debug for Credentials {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("Credentials")
         .field("endpoint", &self.endpoint.as_str())
         .field("token", &"<redacted>")
         .field("expires_at", &self.expires_at)
         .finish()
   }
}

#[derive(Deserialize)]
struct CredentialsResponse {
   token: Option<String>,
   #[serde(rename = "expiresAt")]
   expires_at: Option<String>,
}

impl Credentials {
   /// Build credentials from the backend's `{token, expiresAt}` response body.
   pub(crate) fn from_response(endpoint: Url, body: &str) -> Result<Self> {
      let response: CredentialsResponse = serde_json::from_str(body)
         .map_err(|e| Error::Authentication(format!("invalid credential response: {e}")))?;

      let token = response
         .token
         .filter(|t| !t.trim().is_empty())
         .ok_or_else(|| Error::Authentication("credential response has no token".into()))?;

      let expires_at = match response.expires_at {
         Some(raw) => Some(OffsetDateTime::parse(&raw, &Rfc3339).map_err(|e| {
            Error::Authentication(format!("invalid credential expiry '{raw}': {e}"))
         })?),
         None => None,
      };

      Ok(Self {
         endpoint,
         token,
         expires_at,
      })
   }

   pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
      self.expires_at.is_some_and(|at| at <= now)
   }
}
