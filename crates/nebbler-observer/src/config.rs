/// Configuration for an [`ObservationBroker`](crate::ObservationBroker).
///
/// ```
/// use nebbler_observer::ObserverConfig;
///
/// let config = ObserverConfig::new()
///    .with_tables(["calendars", "events"])
///    .with_channel_capacity(512);
/// assert_eq!(config.tables.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct ObserverConfig {
   /// Tables whose changes are published. Changes to other tables are dropped.
   pub tables: Vec<String>,
   /// Capacity of the broadcast channel. Slow subscribers that fall further
   /// behind than this receive [`TableChangeEvent::Lagged`](crate::TableChangeEvent::Lagged).
   pub channel_capacity: usize,
}

impl ObserverConfig {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_tables<I, S>(mut self, tables: I) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      self.tables = tables.into_iter().map(Into::into).collect();
      self
   }

   pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
      self.channel_capacity = capacity;
      self
   }
}

impl Default for ObserverConfig {
   fn default() -> Self {
      Self {
         tables: Vec::new(),
         channel_capacity: 256,
      }
   }
}
