use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::change::TableChange;
use crate::config::ObserverConfig;

/// Changes collected while a transaction is open.
///
/// A batch is handed to [`ObservationBroker::publish`] after `COMMIT`.
/// Dropping it instead is how a rollback discards its changes.
#[derive(Debug, Default)]
#[must_use = "a batch that is never published is silently discarded"]
pub struct ChangeBatch {
   changes: Vec<TableChange>,
}

impl ChangeBatch {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn push(&mut self, change: TableChange) {
      self.changes.push(change);
   }

   pub fn len(&self) -> usize {
      self.changes.len()
   }

   pub fn is_empty(&self) -> bool {
      self.changes.is_empty()
   }
}

/// Fans committed table changes out to subscribers.
///
/// Publication is gated on commit: writers collect changes into a
/// [`ChangeBatch`] while their transaction is open and publish the batch
/// once `COMMIT` succeeds.
#[derive(Debug)]
pub struct ObservationBroker {
   sender: broadcast::Sender<TableChange>,
   observed: RwLock<BTreeSet<String>>,
}

impl ObservationBroker {
   pub fn new(channel_capacity: usize) -> Arc<Self> {
      let (sender, _) = broadcast::channel(channel_capacity.max(1));
      Arc::new(Self {
         sender,
         observed: RwLock::new(BTreeSet::new()),
      })
   }

   pub fn from_config(config: &ObserverConfig) -> Arc<Self> {
      let broker = Self::new(config.channel_capacity);
      broker.observe_tables(config.tables.iter().map(String::as_str));
      broker
   }

   /// Start publishing changes for these tables.
   pub fn observe_tables<'a>(&self, tables: impl IntoIterator<Item = &'a str>) {
      let mut observed = self.observed.write();
      for table in tables {
         if observed.insert(table.to_string()) {
            debug!(table = %table, "Observing table");
         }
      }
   }

   pub fn is_observed(&self, table: &str) -> bool {
      self.observed.read().contains(table)
   }

   /// Observed tables in name order.
   pub fn get_observed_tables(&self) -> Vec<String> {
      self.observed.read().iter().cloned().collect()
   }

   pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
      self.sender.subscribe()
   }

   pub fn subscriber_count(&self) -> usize {
      self.sender.receiver_count()
   }

   /// Publish a committed batch. Returns how many changes were sent.
   ///
   /// Changes for unobserved tables are dropped. Having no subscribers is
   /// not an error.
   pub fn publish(&self, batch: ChangeBatch) -> usize {
      let mut sent = 0;
      for change in batch.changes {
         if !self.is_observed(&change.table) {
            trace!(table = %change.table, "Dropping change for unobserved table");
            continue;
         }
         trace!(table = %change.table, operation = ?change.operation, row_id = ?change.row_id, "Publishing change");
         // Err only means nobody is listening right now
         let _ = self.sender.send(change);
         sent += 1;
      }
      sent
   }
}
