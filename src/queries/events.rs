use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;
use time::{Date, UtcOffset};

use super::Query;
use crate::schema::{Event, Table};
use crate::timestamp::{end_of_day, format_date, start_of_day};

/// Dot colour for days that have events.
pub const EVENT_DOT_COLOR: &str = "#00DB74";

/// Calendar-widget marker for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateMarker {
   pub marked: bool,
   pub dot_color: &'static str,
}

impl Default for DateMarker {
   fn default() -> Self {
      Self {
         marked: true,
         dot_color: EVENT_DOT_COLOR,
      }
   }
}

/// Live events overlapping the inclusive day range `start..=end`.
///
/// An event overlaps when it starts no later than the last second of `end`
/// and ends no earlier than the first second of `start`. Times are compared
/// as instants, so stored values in either `T` or space-separated form
/// compare correctly.
pub fn events_in_range(start: Date, end: Date) -> Query<Event> {
   Query::new(
      "SELECT * FROM events
       WHERE deleted_at IS NULL
         AND julianday(start_time) <= julianday(?)
         AND julianday(end_time) >= julianday(?)
       ORDER BY julianday(start_time) ASC, id ASC",
      vec![json!(end_of_day(end)), json!(start_of_day(start))],
      vec![Table::Events],
   )
}

/// One marker per UTC day on which an event starts.
///
/// Events whose start time cannot be parsed are skipped.
pub fn marked_dates(events: &[Event]) -> BTreeMap<String, DateMarker> {
   events
      .iter()
      .filter_map(Event::starts_at)
      .map(|at| (format_date(at.to_offset(UtcOffset::UTC).date()), DateMarker::default()))
      .collect()
}
