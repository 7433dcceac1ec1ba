//! Sync status derivation.
//!
//! The presentation state is a pure function of the latest connection
//! signals plus an optional local fault reported by the upload bridge.
//! [`SyncStatusTracker`] recomputes it on every signal change and publishes
//! it over a `watch` channel.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Presentation state of the sync connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
   Connecting,
   Connected,
   Syncing,
   Synced,
   Offline,
   Error,
}

impl SyncState {
   pub fn label(self) -> &'static str {
      match self {
         SyncState::Connecting => "Connecting...",
         SyncState::Connected => "Connected",
         SyncState::Syncing => "Syncing...",
         SyncState::Synced => "Synced",
         SyncState::Offline => "Offline",
         SyncState::Error => "Sync Error",
      }
   }

   /// True while the state is expected to change on its own.
   pub fn is_transient(self) -> bool {
      matches!(self, SyncState::Connecting | SyncState::Syncing)
   }
}

/// Raw signals reported by the sync engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSignals {
   pub connected: bool,
   pub has_synced: bool,
   pub downloading: bool,
   pub uploading: bool,
   pub last_synced_at: Option<OffsetDateTime>,
}

/// Map signals to a presentation state. First matching rule wins; a fault
/// overrides all of them.
pub fn derive_state(signals: &SyncSignals, fault: Option<&str>) -> SyncState {
   if fault.is_some() {
      return SyncState::Error;
   }
   match (signals.connected, signals.has_synced, signals.downloading) {
      (false, false, _) => SyncState::Connecting,
      (false, true, _) => SyncState::Offline,
      (true, _, true) => SyncState::Syncing,
      (true, true, false) => SyncState::Synced,
      (true, false, false) => SyncState::Connected,
   }
}

/// Snapshot handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusInfo {
   pub state: SyncState,
   pub is_connected: bool,
   pub is_syncing: bool,
   pub has_synced: bool,
   #[serde(with = "time::serde::rfc3339::option")]
   pub last_synced_at: Option<OffsetDateTime>,
   pub has_pending_uploads: bool,
   pub fault: Option<String>,
}

impl SyncStatusInfo {
   pub fn from_signals(signals: &SyncSignals, fault: Option<&str>) -> Self {
      Self {
         state: derive_state(signals, fault),
         is_connected: signals.connected,
         is_syncing: signals.downloading,
         has_synced: signals.has_synced,
         last_synced_at: signals.last_synced_at,
         has_pending_uploads: signals.uploading,
         fault: fault.map(str::to_string),
      }
   }
}

impl Default for SyncStatusInfo {
   fn default() -> Self {
      Self::from_signals(&SyncSignals::default(), None)
   }
}

#[derive(Debug, Default)]
struct TrackerState {
   signals: SyncSignals,
   fault: Option<String>,
}

/// Holds the latest signals and fault and publishes derived snapshots.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct SyncStatusTracker {
   state: Arc<Mutex<TrackerState>>,
   sender: Arc<watch::Sender<SyncStatusInfo>>,
}

impl SyncStatusTracker {
   pub fn new() -> Self {
      let (sender, _) = watch::channel(SyncStatusInfo::default());
      Self {
         state: Arc::new(Mutex::new(TrackerState::default())),
         sender: Arc::new(sender),
      }
   }

   pub fn current(&self) -> SyncStatusInfo {
      self.sender.borrow().clone()
   }

   pub fn subscribe(&self) -> watch::Receiver<SyncStatusInfo> {
      self.sender.subscribe()
   }

   /// Replace the engine signals.
   pub fn update_signals(&self, signals: SyncSignals) {
      let mut state = self.state.lock();
      state.signals = signals;
      self.publish(&state);
   }

   /// Change some signals in place.
   pub fn modify_signals(&self, modify: impl FnOnce(&mut SyncSignals)) {
      let mut state = self.state.lock();
      modify(&mut state.signals);
      self.publish(&state);
   }

   /// Assert the error state until [`clear_fault`](Self::clear_fault).
   pub fn report_fault(&self, reason: impl Into<String>) {
      let mut state = self.state.lock();
      let reason = reason.into();
      warn!(reason = %reason, "Sync fault reported");
      state.fault = Some(reason);
      self.publish(&state);
   }

   pub fn clear_fault(&self) {
      let mut state = self.state.lock();
      if state.fault.take().is_some() {
         debug!("Sync fault cleared");
         self.publish(&state);
      }
   }

   fn publish(&self, state: &TrackerState) {
      let next = SyncStatusInfo::from_signals(&state.signals, state.fault.as_deref());
      self.sender.send_if_modified(|current| {
         if *current == next {
            return false;
         }
         debug!(from = ?current.state, to = ?next.state, "Sync state changed");
         *current = next;
         true
      });
   }
}

impl Default for SyncStatusTracker {
   fn default() -> Self {
      Self::new()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn signals(connected: bool, has_synced: bool, downloading: bool) -> SyncSignals {
      SyncSignals {
         connected,
         has_synced,
         downloading,
         ..Default::default()
      }
   }

   #[test]
   fn test_decision_list() {
      assert_eq!(derive_state(&signals(false, false, false), None), SyncState::Connecting);
      assert_eq!(derive_state(&signals(false, false, true), None), SyncState::Connecting);
      assert_eq!(derive_state(&signals(false, true, false), None), SyncState::Offline);
      assert_eq!(derive_state(&signals(false, true, true), None), SyncState::Offline);
      assert_eq!(derive_state(&signals(true, false, true), None), SyncState::Syncing);
      assert_eq!(derive_state(&signals(true, true, true), None), SyncState::Syncing);
      assert_eq!(derive_state(&signals(true, true, false), None), SyncState::Synced);
      assert_eq!(derive_state(&signals(true, false, false), None), SyncState::Connected);
   }

   #[test]
   fn test_fault_overrides_signals() {
      for connected in [false, true] {
         for has_synced in [false, true] {
            let state = derive_state(&signals(connected, has_synced, false), Some("disk full"));
            assert_eq!(state, SyncState::Error);
         }
      }
   }

   #[test]
   fn test_info_serializes_camel_case() {
      let info = SyncStatusInfo::from_signals(&signals(true, true, false), None);
      let json = serde_json::to_value(&info).unwrap();
      assert_eq!(json["state"], "synced");
      assert_eq!(json["isConnected"], true);
      assert_eq!(json["lastSyncedAt"], serde_json::Value::Null);
   }

   #[tokio::test]
   async fn test_tracker_publishes_changes_only() {
      let tracker = SyncStatusTracker::new();
      let mut rx = tracker.subscribe();
      assert_eq!(tracker.current().state, SyncState::Connecting);

      tracker.modify_signals(|s| s.connected = true);
      rx.changed().await.unwrap();
      assert_eq!(rx.borrow_and_update().state, SyncState::Connected);

      // Same signals again: nothing published
      tracker.modify_signals(|s| s.connected = true);
      assert!(!rx.has_changed().unwrap());

      tracker.report_fault("uploads failing");
      rx.changed().await.unwrap();
      assert_eq!(rx.borrow_and_update().state, SyncState::Error);

      tracker.clear_fault();
      rx.changed().await.unwrap();
      let info = rx.borrow_and_update().clone();
      assert_eq!(info.state, SyncState::Connected);
      assert!(info.fault.is_none());
   }
}
