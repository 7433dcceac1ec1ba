//! Timestamp and calendar-day helpers.
//!
//! Local writes stamp rows with RFC 3339 UTC strings at millisecond
//! precision. Those values are provisional: the server's own timestamps
//! replace them when the row round-trips through replication, so nothing in
//! this crate orders rows across devices by a locally produced timestamp.

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::{Error, Result};

/// Current instant as a stored timestamp string.
pub fn now() -> String {
   format_timestamp(OffsetDateTime::now_utc())
}

/// `2026-02-15T10:00:00.000Z` form, always UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
   let at = at.to_offset(UtcOffset::UTC);
   at.format(format_description!(
      "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
   ))
   .unwrap_or_else(|_| at.to_string())
}

/// `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
   date
      .format(format_description!("[year]-[month]-[day]"))
      .unwrap_or_else(|_| date.to_string())
}

/// Parse a `YYYY-MM-DD` calendar day.
pub fn parse_date(value: &str) -> Result<Date> {
   Date::parse(value, format_description!("[year]-[month]-[day]"))
      .map_err(|e| Error::validation(format!("invalid date '{value}': {e}")))
}

/// Parse a stored timestamp.
///
/// Accepts RFC 3339 (`T` or space separated, as written locally or by the
/// replication stream) and offset-less values, which are read as UTC.
/// Returns `None` for anything else.
pub fn parse_timestamp(value: &str) -> Option<OffsetDateTime> {
   let value = value.trim();
   if let Ok(at) = OffsetDateTime::parse(value, &Rfc3339) {
      return Some(at);
   }

   let normalized = value.replacen(' ', "T", 1);
   if let Ok(at) = OffsetDateTime::parse(&normalized, &Rfc3339) {
      return Some(at);
   }

   PrimitiveDateTime::parse(
      &normalized,
      format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
   )
   .ok()
   .map(PrimitiveDateTime::assume_utc)
}

/// First instant of `date` as an inclusive range bound.
pub(crate) fn start_of_day(date: Date) -> String {
   format!("{}T00:00:00Z", format_date(date))
}

/// Last whole second of `date` as an inclusive range bound.
pub(crate) fn end_of_day(date: Date) -> String {
   format!("{}T23:59:59Z", format_date(date))
}

#[cfg(test)]
mod tests {
   use super::*;
   use time::macros::{date, datetime};

   #[test]
   fn test_format_timestamp_is_utc_millis() {
      let at = datetime!(2026-02-15 12:30:05.123456 +02:00);
      assert_eq!(format_timestamp(at), "2026-02-15T10:30:05.123Z");
      assert_eq!(
         format_timestamp(datetime!(2026-03-01 00:30 +01:00)),
         "2026-02-28T23:30:00.000Z"
      );
      assert_eq!(format_date(date!(999 - 01 - 05)), "0999-01-05");
   }

   #[test]
   fn test_now_round_trips() {
      let stamp = now();
      assert!(stamp.ends_with('Z'));
      assert!(parse_timestamp(&stamp).is_some());
   }

   #[test]
   fn test_parse_date() {
      assert_eq!(parse_date("2026-02-01").unwrap(), date!(2026 - 02 - 01));
      assert!(matches!(parse_date("2026-02-30"), Err(Error::Validation(_))));
      assert!(matches!(parse_date("02/01/2026"), Err(Error::Validation(_))));
   }

   #[test]
   fn test_parse_timestamp_variants() {
      let expected = datetime!(2026-02-15 10:00:00 UTC);
      assert_eq!(parse_timestamp("2026-02-15T10:00:00Z"), Some(expected));
      assert_eq!(parse_timestamp("2026-02-15T10:00:00.000Z"), Some(expected));
      assert_eq!(parse_timestamp("2026-02-15 10:00:00Z"), Some(expected));
      assert_eq!(parse_timestamp("2026-02-15T10:00:00"), Some(expected));
      assert_eq!(
         parse_timestamp("2026-02-15T12:00:00+02:00").map(|t| t.to_offset(UtcOffset::UTC)),
         Some(expected)
      );
      assert_eq!(parse_timestamp("not a time"), None);
      assert_eq!(parse_timestamp(""), None);
   }

   #[test]
   fn test_day_bounds() {
      let day = date!(2026 - 02 - 28);
      assert_eq!(start_of_day(day), "2026-02-28T00:00:00Z");
      assert_eq!(end_of_day(day), "2026-02-28T23:59:59Z");
   }
}
