use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::credentials::Credentials;
use super::http::{HttpClient, HttpMethod, HttpRequest};
use crate::auth::AuthSession;
use crate::config::SyncConfig;
use crate::crud::{CrudEntry, CrudSource, UpdateType};
use crate::{Error, Result};

/// Bridge between the local change queue and the backend.
///
/// Fetches sync credentials and uploads queued change-sets. The signed-in
/// user's token, when there is one, is sent as a bearer token on every call.
pub struct BackendConnector<C> {
   config: SyncConfig,
   client: C,
   session: AuthSession,
}

impl<C: HttpClient> BackendConnector<C> {
   pub fn new(config: SyncConfig, client: C, session: AuthSession) -> Self {
      Self {
         config,
         client,
         session,
      }
   }

   pub fn config(&self) -> &SyncConfig {
      &self.config
   }

   /// `POST {backend}/api/powersync/auth`.
   ///
   /// Any failure (transport, status, body) is an authentication error and
   /// no partial credential is returned.
   pub async fn fetch_credentials(&self) -> Result<Credentials> {
      let url = self.config.backend_endpoint(&["api", "powersync", "auth"])?;
      let request = HttpRequest::new(HttpMethod::Post, url).with_bearer(self.session.token());

      let response = self
         .client
         .send(request)
         .await
         .map_err(|e| Error::Authentication(format!("credential request failed: {e}")))?;

      if !response.is_success() {
         warn!(status = response.status, "Credential endpoint rejected request");
         return Err(Error::Authentication(format!(
            "credential endpoint returned HTTP {}",
            response.status
         )));
      }

      let credentials = Credentials::from_response(self.config.powersync_url().clone(), &response.body)?;
      debug!(expires_at = ?credentials.expires_at, "Fetched sync credentials");
      Ok(credentials)
   }

   /// Upload queued change-sets oldest first. Returns how many were acknowledged.
   ///
   /// A change-set is acknowledged only after every entry was accepted. The
   /// first failing entry stops the drain and leaves its change-set pending.
   pub async fn upload_data(&self, source: &dyn CrudSource) -> Result<usize> {
      let mut acknowledged = 0;

      while let Some(transaction) = source.next_crud_transaction().await? {
         debug!(
            transaction_id = transaction.id,
            entries = transaction.crud.len(),
            "Uploading change-set"
         );

         for entry in &transaction.crud {
            if let Err(e) = self.upload_entry(entry).await {
               warn!(
                  transaction_id = transaction.id,
                  table = %entry.table,
                  id = %entry.id,
                  error = %e,
                  "Upload failed, change-set left pending"
               );
               return Err(e);
            }
         }

         source.complete_transaction(transaction.id).await?;
         acknowledged += 1;
      }

      Ok(acknowledged)
   }

   /// `PUT`/`PATCH` with the entry's columns, or `DELETE` without a body,
   /// to `{backend}/api/data/{table}/{id}`.
   async fn upload_entry(&self, entry: &CrudEntry) -> Result<()> {
      let upload_error = |reason: String| Error::Upload {
         table: entry.table.clone(),
         id: entry.id.clone(),
         reason,
      };

      let url = self
         .config
         .backend_endpoint(&["api", "data", &entry.table, &entry.id])?;
      let mut request = HttpRequest::new(entry.op.http_method(), url).with_bearer(self.session.token());
      if entry.op != UpdateType::Delete {
         let data = entry.op_data.clone().unwrap_or_default();
         request = request.with_json(JsonValue::Object(data));
      }

      let response = self
         .client
         .send(request)
         .await
         .map_err(|e| upload_error(e.to_string()))?;

      if !response.is_success() {
         return Err(upload_error(format!("HTTP {}", response.status)));
      }
      Ok(())
   }
}
