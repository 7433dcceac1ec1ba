use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::change::{TableChange, TableChangeEvent};

/// A filtered stream of table change notifications.
///
/// Wraps a `BroadcastStream` with optional table filtering. Ends when the
/// broker is dropped.
pub struct TableChangeStream {
   inner: BroadcastStream<TableChange>,
   filter_tables: Option<Vec<String>>,
}

impl TableChangeStream {
   pub fn new(rx: broadcast::Receiver<TableChange>) -> Self {
      Self {
         inner: BroadcastStream::new(rx),
         filter_tables: None,
      }
   }

   /// Only yield changes for these tables. Lag notices are always yielded.
   pub fn filter_tables(mut self, tables: Vec<String>) -> Self {
      self.filter_tables = Some(tables);
      self
   }

   fn wants(&self, table: &str) -> bool {
      match &self.filter_tables {
         Some(tables) => tables.iter().any(|t| t == table),
         None => true,
      }
   }
}

impl Stream for TableChangeStream {
   type Item = TableChangeEvent;

   fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
      loop {
         // BroadcastStream is Unpin
         let inner = Pin::new(&mut self.inner);

         match inner.poll_next(cx) {
            Poll::Ready(Some(Ok(change))) => {
               if !self.wants(&change.table) {
                  continue;
               }
               return Poll::Ready(Some(TableChangeEvent::Change(change)));
            }
            Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
               warn!(missed = count, "Change stream lagged, subscriber must refresh");
               return Poll::Ready(Some(TableChangeEvent::Lagged(count)));
            }
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Pending => return Poll::Pending,
         }
      }
   }
}

/// Converts broadcast receivers into [`TableChangeStream`]s.
pub trait TableChangeStreamExt {
   fn into_stream(self) -> TableChangeStream;
}

impl TableChangeStreamExt for broadcast::Receiver<TableChange> {
   fn into_stream(self) -> TableChangeStream {
      TableChangeStream::new(self)
   }
}
