//! Background upload loop.

use std::sync::Arc;

use futures::StreamExt;
use nebbler_observer::TableChangeStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::BackendConnector;
use super::credentials::Credentials;
use super::http::HttpClient;
use crate::Result;
use crate::status::SyncStatusTracker;
use crate::store::LocalStore;

/// A running connection: credentials plus the task draining the upload queue.
///
/// The task wakes on every newly queued change-set and, after a failure,
/// retries on the configured interval. Dropping the session stops it.
pub struct SyncSession {
   credentials: Credentials,
   status: SyncStatusTracker,
   task: JoinHandle<()>,
}

impl SyncSession {
   /// Fetch credentials and start draining the queue.
   ///
   /// Credential failures are returned and no task is started.
   pub async fn connect<C: HttpClient + 'static>(
      connector: Arc<BackendConnector<C>>,
      store: LocalStore,
      status: SyncStatusTracker,
   ) -> Result<Self> {
      let credentials = connector.fetch_credentials().await?;
      let queue = store.subscribe_queue();
      status.modify_signals(|s| s.connected = true);

      let task = tokio::spawn(run_uploads(connector, store, status.clone(), queue));
      info!(endpoint = %credentials.endpoint, "Sync session started");

      Ok(Self {
         credentials,
         status,
         task,
      })
   }

   pub fn credentials(&self) -> &Credentials {
      &self.credentials
   }

   pub fn is_active(&self) -> bool {
      !self.task.is_finished()
   }

   /// Stop the upload task and wait for it to finish. Pending change-sets
   /// stay queued.
   pub async fn disconnect(mut self) {
      self.task.abort();
      // Cancelled is the expected outcome
      let _ = (&mut self.task).await;
      self.status.modify_signals(|s| {
         s.connected = false;
         s.uploading = false;
      });
      info!("Sync session stopped");
   }
}

impl Drop for SyncSession {
   fn drop(&mut self) {
      self.task.abort();
   }
}

async fn run_uploads<C: HttpClient>(
   connector: Arc<BackendConnector<C>>,
   store: LocalStore,
   status: SyncStatusTracker,
   mut queue: TableChangeStream,
) {
   let threshold = connector.config().upload_fault_threshold;
   let retry_interval = connector.config().upload_retry_interval;
   let mut failures: u32 = 0;

   loop {
      status.modify_signals(|s| s.uploading = true);
      match connector.upload_data(&store).await {
         Ok(acknowledged) => {
            if acknowledged > 0 {
               debug!(acknowledged, "Upload queue drained");
            }
            failures = 0;
            status.clear_fault();
         }
         Err(e) => {
            failures = failures.saturating_add(1);
            warn!(error = %e, failures, "Upload attempt failed");
            if failures >= threshold {
               status.report_fault(e.to_string());
            }
         }
      }

      let pending = store.pending_transaction_count().await.unwrap_or_else(|e| {
         warn!(error = %e, "Failed to count pending change-sets");
         1
      });
      status.modify_signals(|s| s.uploading = pending > 0);

      if failures == 0 {
         // Queue is empty; sleep until something new is queued
         match queue.next().await {
            Some(_) => continue,
            None => break,
         }
      }

      tokio::select! {
         next = queue.next() => {
            if next.is_none() {
               break;
            }
         }
         _ = tokio::time::sleep(retry_interval) => {}
      }
   }

   debug!("Upload loop ended");
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::auth::AuthSession;
   use crate::config::SyncConfig;
   use crate::connector::{HttpRequest, HttpResponse};
   use crate::mutations::{Mutations, NewUser};
   use crate::status::SyncState;
   use async_trait::async_trait;
   use parking_lot::Mutex;
   use std::time::Duration;
   use tempfile::TempDir;

   /// Accepts credential requests and answers uploads with `upload_status`.
   struct StubBackend {
      upload_status: Mutex<u16>,
      uploads: Mutex<Vec<HttpRequest>>,
   }

   #[async_trait]
   impl HttpClient for StubBackend {
      async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
         if request.url.path().ends_with("/powersync/auth") {
            return Ok(HttpResponse::new(200, r#"{"token":"sync-token"}"#));
         }
         let status = *self.upload_status.lock();
         self.uploads.lock().push(request);
         Ok(HttpResponse::new(status, ""))
      }
   }

   async fn setup(upload_status: u16) -> (Arc<StubBackend>, LocalStore, SyncStatusTracker, SyncConfig, TempDir) {
      let temp_dir = TempDir::new().expect("Failed to create temp directory");
      let store = LocalStore::open(temp_dir.path().join("test.db"), None)
         .await
         .expect("Failed to open store");
      let backend = Arc::new(StubBackend {
         upload_status: Mutex::new(upload_status),
         uploads: Mutex::new(Vec::new()),
      });
      let config = SyncConfig::new("https://sync.example.com", "https://api.example.com")
         .unwrap()
         .with_upload_retry_interval(Duration::from_millis(20))
         .with_upload_fault_threshold(2);
      (backend, store, SyncStatusTracker::new(), config, temp_dir)
   }

   async fn wait_for(mut condition: impl AsyncFnMut() -> bool) {
      for _ in 0..200 {
         if condition().await {
            return;
         }
         tokio::time::sleep(Duration::from_millis(10)).await;
      }
      panic!("condition not reached");
   }

   #[tokio::test]
   async fn test_session_uploads_new_change_sets() {
      let (backend, store, status, config, _temp) = setup(200).await;
      let connector = Arc::new(BackendConnector::new(config, backend.clone(), AuthSession::default()));
      let session = SyncSession::connect(connector, store.clone(), status.clone())
         .await
         .unwrap();
      assert_eq!(session.credentials().token, "sync-token");
      assert!(session.is_active());
      assert!(status.current().is_connected);

      Mutations::new(store.clone())
         .create_user(NewUser {
            email: "ada@example.com".into(),
            ..Default::default()
         })
         .await
         .unwrap();

      wait_for(async || store.pending_transaction_count().await.unwrap() == 0).await;
      wait_for(async || !status.current().has_pending_uploads).await;
      assert_eq!(backend.uploads.lock().len(), 1);

      session.disconnect().await;
      assert!(!status.current().is_connected);
      store.remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_repeated_failures_raise_fault_until_success() {
      let (backend, store, status, config, _temp) = setup(503).await;
      Mutations::new(store.clone())
         .create_user(NewUser {
            email: "ada@example.com".into(),
            ..Default::default()
         })
         .await
         .unwrap();

      let connector = Arc::new(BackendConnector::new(config, backend.clone(), AuthSession::default()));
      let session = SyncSession::connect(connector, store.clone(), status.clone())
         .await
         .unwrap();

      wait_for(async || status.current().state == SyncState::Error).await;
      assert_eq!(store.pending_transaction_count().await.unwrap(), 1);

      *backend.upload_status.lock() = 200;
      wait_for(async || status.current().fault.is_none()).await;
      assert_eq!(store.pending_transaction_count().await.unwrap(), 0);

      session.disconnect().await;
      store.remove().await.unwrap();
   }
}
