use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nebbler_sync::auth::{AuthService, LoginCredentials, MockAuthBackend, RegisterCredentials};
use nebbler_sync::connector::{HttpMethod, HttpRequest, HttpResponse};
use nebbler_sync::crud::{CrudEntry, CrudSource, CrudTransaction, UpdateType};
use nebbler_sync::mutations::{NewCalendar, NewUser};
use nebbler_sync::schema::{CalendarType, Table};
use nebbler_sync::status::SyncSignals;
use nebbler_sync::{
   AuthSession, BackendConnector, Error, HttpClient, RemoteChange, Result, SyncConfig, SyncLayer,
   SyncState,
};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

/// Backend double: issues credentials and accepts uploads unless the
/// request path contains `fail_path`.
#[derive(Default)]
struct FakeBackend {
   reject_credentials: bool,
   fail_path: Mutex<Option<String>>,
   uploads: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl HttpClient for FakeBackend {
   async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
      if request.url.path() == "/api/powersync/auth" {
         if self.reject_credentials {
            return Ok(HttpResponse::new(401, r#"{"error":"unauthorized"}"#));
         }
         return Ok(HttpResponse::new(
            200,
            r#"{"token":"sync-token","expiresAt":"2030-01-01T00:00:00Z"}"#,
         ));
      }

      let failing = self
         .fail_path
         .lock()
         .as_deref()
         .is_some_and(|fragment| request.url.path().contains(fragment));
      self.uploads.lock().push(request);
      if failing {
         return Ok(HttpResponse::new(500, ""));
      }
      Ok(HttpResponse::new(200, ""))
   }
}

fn config() -> SyncConfig {
   SyncConfig::new("https://sync.example.com", "https://api.example.com")
      .unwrap()
      .with_upload_retry_interval(Duration::from_millis(20))
      .with_upload_fault_threshold(2)
}

async fn open_layer() -> (SyncLayer, TempDir) {
   let _ = tracing_subscriber::fmt().with_test_writer().try_init();
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let layer = SyncLayer::open(config(), temp_dir.path().join("test.db"), None)
      .await
      .expect("Failed to open sync layer");
   (layer, temp_dir)
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

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn test_status_follows_signals() {
   let (layer, _temp) = open_layer().await;
   let status = layer.status();
   assert_eq!(status.current().state, SyncState::Connecting);
   assert_eq!(status.current().state.label(), "Connecting...");

   let cases = [
      ((true, false, false), SyncState::Connected, "Connected"),
      ((true, false, true), SyncState::Syncing, "Syncing..."),
      ((true, true, false), SyncState::Synced, "Synced"),
      ((false, true, false), SyncState::Offline, "Offline"),
   ];
   for ((connected, has_synced, downloading), state, label) in cases {
      status.update_signals(SyncSignals {
         connected,
         has_synced,
         downloading,
         ..Default::default()
      });
      let info = status.current();
      assert_eq!(info.state, state);
      assert_eq!(info.state.label(), label);
   }

   status.report_fault("disk full");
   assert_eq!(status.current().state.label(), "Sync Error");

   layer.close().await.unwrap();
}

// ============================================================================
// Upload bridge
// ============================================================================

/// Queue double holding one change-set.
struct SingleChangeSet {
   pending: Mutex<VecDeque<CrudTransaction>>,
   acknowledged: Mutex<Vec<i64>>,
}

#[async_trait]
impl CrudSource for SingleChangeSet {
   async fn next_crud_transaction(&self) -> Result<Option<CrudTransaction>> {
      Ok(self.pending.lock().front().cloned())
   }

   async fn complete_transaction(&self, transaction_id: i64) -> Result<()> {
      self.pending.lock().retain(|t| t.id != transaction_id);
      self.acknowledged.lock().push(transaction_id);
      Ok(())
   }
}

#[tokio::test]
async fn test_failure_mid_change_set_acknowledges_nothing() {
   let entry = |id: &str| CrudEntry {
      op: UpdateType::Put,
      table: "events".into(),
      id: id.into(),
      op_data: json!({"title": id}).as_object().cloned(),
   };
   let source = SingleChangeSet {
      pending: Mutex::new(VecDeque::from([CrudTransaction {
         id: 1,
         crud: vec![entry("first"), entry("second"), entry("third")],
      }])),
      acknowledged: Mutex::new(Vec::new()),
   };
   let backend = FakeBackend::default();
   *backend.fail_path.lock() = Some("second".into());
   let connector = BackendConnector::new(config(), backend, AuthSession::new());

   let err = connector.upload_data(&source).await.unwrap_err();

   assert!(matches!(&err, Error::Upload { id, .. } if id == "second"));
   assert!(err.is_retryable());
   assert!(source.acknowledged.lock().is_empty());
   assert_eq!(source.pending.lock().len(), 1);
}

#[tokio::test]
async fn test_store_change_set_stays_pending_until_every_entry_uploads() {
   let (layer, _temp) = open_layer().await;
   layer
      .mutations()
      .create_calendar(
         NewCalendar {
            owner_id: "u1".into(),
            calendar_type: CalendarType::Public,
            name: "Club".into(),
            description: None,
         },
         "role-owner",
      )
      .await
      .unwrap();

   let backend = Arc::new(FakeBackend::default());
   *backend.fail_path.lock() = Some("calendar_members".into());
   let connector = BackendConnector::new(config(), backend.clone(), AuthSession::new());

   assert!(connector.upload_data(layer.store()).await.is_err());
   assert_eq!(layer.store().pending_transaction_count().await.unwrap(), 1);
   assert_eq!(backend.uploads.lock().len(), 2);

   *backend.fail_path.lock() = None;
   assert_eq!(connector.upload_data(layer.store()).await.unwrap(), 1);
   assert_eq!(layer.store().pending_transaction_count().await.unwrap(), 0);

   layer.close().await.unwrap();
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn test_connect_surfaces_credential_failure() {
   let (layer, _temp) = open_layer().await;
   let backend = FakeBackend {
      reject_credentials: true,
      ..Default::default()
   };

   let err = layer.connect(backend, AuthSession::new()).await.unwrap_err();

   assert!(matches!(err, Error::Authentication(_)));
   assert_eq!(err.error_code(), "AUTHENTICATION_ERROR");
   assert!(!layer.is_connected());

   layer.close().await.unwrap();
}

#[tokio::test]
async fn test_signed_in_session_uploads_with_bearer_token() {
   let (layer, _temp) = open_layer().await;

   let auth = AuthService::new(MockAuthBackend::new());
   auth
      .register(&RegisterCredentials {
         first_name: "Ada".into(),
         last_name: "Lovelace".into(),
         email: "ada@example.com".into(),
         password: "Analytical1".into(),
         confirm_password: "Analytical1".into(),
         username: "ada_l".into(),
      })
      .await
      .unwrap();
   auth.logout().await.unwrap();
   auth
      .login(&LoginCredentials::new("ada@example.com", "Analytical1"))
      .await
      .unwrap();
   let user_token = auth.session().token().unwrap();

   let backend = Arc::new(FakeBackend::default());
   let credentials = layer.connect(backend.clone(), auth.session()).await.unwrap();
   assert_eq!(credentials.token, "sync-token");
   assert!(layer.is_connected());

   let user_id = layer
      .mutations()
      .create_user(NewUser {
         first_name: "Grace".into(),
         last_name: "Hopper".into(),
         email: "grace@example.com".into(),
         ..Default::default()
      })
      .await
      .unwrap();

   wait_for(async || layer.store().pending_transaction_count().await.unwrap() == 0).await;

   {
      let uploads = backend.uploads.lock();
      assert_eq!(uploads.len(), 1);
      let upload = &uploads[0];
      assert_eq!(upload.method, HttpMethod::Put);
      assert_eq!(upload.url.path(), format!("/api/data/users/{user_id}"));
      assert_eq!(upload.bearer_token.as_deref(), Some(user_token.as_str()));
      let body = upload.body.as_ref().unwrap();
      assert_eq!(body["email"], "grace@example.com");
      assert!(body.get("inserted_at").is_none());
      assert!(body.get("updated_at").is_none());
   }

   layer.disconnect().await;
   assert!(!layer.is_connected());

   // Writes while disconnected wait in the queue
   layer.mutations().delete_user(&user_id).await.unwrap();
   tokio::time::sleep(Duration::from_millis(50)).await;
   assert_eq!(layer.store().pending_transaction_count().await.unwrap(), 1);

   layer.close().await.unwrap();
}

#[tokio::test]
async fn test_status_follows_session_lifecycle() {
   let (layer, _temp) = open_layer().await;
   let status = layer.status();
   let updates = status.subscribe();
   assert_eq!(status.current().state, SyncState::Connecting);

   // A rejected connect leaves the status alone
   let rejecting = FakeBackend {
      reject_credentials: true,
      ..Default::default()
   };
   assert!(layer.connect(rejecting, AuthSession::new()).await.is_err());
   assert!(!status.current().is_connected);

   layer.connect(FakeBackend::default(), AuthSession::new()).await.unwrap();
   assert!(updates.has_changed().unwrap());
   let info = status.current();
   assert!(info.is_connected);
   assert_eq!(info.state, SyncState::Connected);

   layer
      .apply_remote(vec![RemoteChange::Upsert {
         table: Table::Users,
         row: json!({"id": "remote-user", "email": "remote@example.com"})
            .as_object()
            .cloned()
            .unwrap(),
      }])
      .await
      .unwrap();
   let info = status.current();
   assert_eq!(info.state, SyncState::Synced);
   assert!(info.last_synced_at.is_some());

   layer.disconnect().await;
   let info = status.current();
   assert!(!info.is_connected);
   assert_eq!(info.state, SyncState::Offline);
   assert_eq!(info.state.label(), "Offline");

   layer.close().await.unwrap();
}

#[tokio::test]
async fn test_persistent_upload_failure_raises_fault() {
   let (layer, _temp) = open_layer().await;
   let backend = Arc::new(FakeBackend::default());
   *backend.fail_path.lock() = Some("/api/data/".into());

   layer.connect(backend.clone(), AuthSession::new()).await.unwrap();
   layer
      .mutations()
      .create_user(NewUser {
         email: "ada@example.com".into(),
         ..Default::default()
      })
      .await
      .unwrap();

   wait_for(async || layer.status().current().state == SyncState::Error).await;
   assert!(layer.status().current().fault.is_some());
   assert_eq!(layer.store().pending_transaction_count().await.unwrap(), 1);

   *backend.fail_path.lock() = None;
   wait_for(async || layer.status().current().fault.is_none()).await;
   assert_eq!(layer.store().pending_transaction_count().await.unwrap(), 0);

   layer.close().await.unwrap();
}
