//! # nebbler-observer
//!
//! Commit-gated change notifications for the Nebbler local store.
//!
//! Writers collect [`TableChange`]s in a [`ChangeBatch`] while their
//! transaction is open and hand the batch to an [`ObservationBroker`] only
//! after `COMMIT` succeeds. Subscribers therefore never observe a change that
//! was rolled back, and see the changes of one transaction in statement order.
//!
//! ```
//! use nebbler_observer::{ChangeBatch, ChangeOperation, ObservationBroker, ObserverConfig, TableChange};
//!
//! let broker = ObservationBroker::from_config(&ObserverConfig::new().with_tables(["events"]));
//! let mut rx = broker.subscribe();
//!
//! let mut batch = ChangeBatch::new();
//! batch.push(TableChange::new("events", ChangeOperation::Insert, Some("e1".into())));
//! // ... COMMIT succeeded
//! broker.publish(batch);
//!
//! assert_eq!(rx.try_recv().unwrap().table, "events");
//! ```

mod broker;
mod change;
mod config;
mod stream;

pub use broker::{ChangeBatch, ObservationBroker};
pub use change::{ChangeOperation, TableChange, TableChangeEvent};
pub use config::ObserverConfig;
pub use stream::{TableChangeStream, TableChangeStreamExt};
