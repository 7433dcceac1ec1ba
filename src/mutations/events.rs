use serde_json::json;
use time::OffsetDateTime;

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::Table;
use crate::store::RowWrite;
use crate::timestamp::{self, format_timestamp};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct NewEvent {
   pub calendar_id: String,
   pub created_by_user_id: String,
   pub title: String,
   pub description: Option<String>,
   pub start_time: OffsetDateTime,
   pub end_time: OffsetDateTime,
}

/// Partial event update.
///
/// A single supplied time is checked against the stored other end inside
/// the same write, so the row never ends before it starts.
#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
   pub calendar_id: Option<String>,
   pub title: Option<String>,
   pub description: Option<Option<String>>,
   pub start_time: Option<OffsetDateTime>,
   pub end_time: Option<OffsetDateTime>,
}

fn check_interval(start: OffsetDateTime, end: OffsetDateTime) -> Result<()> {
   if end < start {
      return Err(Error::validation("event end_time is before start_time"));
   }
   Ok(())
}

impl Mutations {
   pub async fn create_event(&self, event: NewEvent) -> Result<String> {
      require_text("event title", &event.title)?;
      require_text("calendar_id", &event.calendar_id)?;
      check_interval(event.start_time, event.end_time)?;

      let id = new_id();
      let now = timestamp::now();
      let write = RowWrite::insert(
         Table::Events,
         &id,
         vec![
            ("calendar_id", json!(event.calendar_id)),
            ("created_by_user_id", json!(event.created_by_user_id)),
            ("title", json!(event.title)),
            ("description", json!(event.description)),
            ("start_time", json!(format_timestamp(event.start_time))),
            ("end_time", json!(format_timestamp(event.end_time))),
            ("is_recurring", json!(false)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   pub async fn update_event(&self, id: &str, update: EventUpdate) -> Result<bool> {
      if let Some(title) = &update.title {
         require_text("event title", title)?;
      }
      if let (Some(start), Some(end)) = (update.start_time, update.end_time) {
         check_interval(start, end)?;
      }

      let start = update.start_time.map(format_timestamp);
      let end = update.end_time.map(format_timestamp);
      let retimed = start.is_some() != end.is_some();

      let builder = UpdateBuilder::new(Table::Events)
         .set_opt("calendar_id", update.calendar_id)
         .set_opt("title", update.title)
         .set_nullable("description", update.description)
         .set_opt("start_time", start.clone())
         .set_opt("end_time", end.clone());
      let Some(mut write) = builder.build(id, &timestamp::now()) else {
         return Ok(false);
      };
      if retimed {
         write = write.with_guard(
            "SELECT julianday(COALESCE(?, end_time)) < julianday(COALESCE(?, start_time))
             FROM events WHERE id = ? AND deleted_at IS NULL",
            vec![json!(end), json!(start), json!(id)],
            "event end_time is before start_time",
         );
      }

      self.commit(vec![write]).await?;
      Ok(true)
   }

   pub async fn delete_event(&self, id: &str) -> Result<()> {
      self.delete(Table::Events, id).await
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::crud::{CrudSource, UpdateType};
   use crate::mutations::test_support::{create_test_mutations, scalar};
   use time::macros::datetime;

   fn standup() -> NewEvent {
      NewEvent {
         calendar_id: "cal-1".into(),
         created_by_user_id: "user-1".into(),
         title: "Standup".into(),
         description: None,
         start_time: datetime!(2026-02-15 10:00 UTC),
         end_time: datetime!(2026-02-15 10:15 UTC),
      }
   }

   #[tokio::test]
   async fn test_create_event() {
      let (mutations, _temp) = create_test_mutations().await;

      let id = mutations.create_event(standup()).await.unwrap();

      assert_eq!(
         scalar(&mutations, "SELECT start_time FROM events WHERE id = ?", vec![json!(id)]).await,
         json!("2026-02-15T10:00:00.000Z")
      );
      assert_eq!(
         scalar(&mutations, "SELECT is_recurring FROM events WHERE id = ?", vec![json!(id)]).await,
         json!(0)
      );

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_end_before_start_rejected() {
      let (mutations, _temp) = create_test_mutations().await;
      let mut event = standup();
      event.end_time = datetime!(2026-02-15 09:00 UTC);

      assert!(matches!(mutations.create_event(event).await, Err(Error::Validation(_))));
      assert_eq!(scalar(&mutations, "SELECT COUNT(*) FROM events", vec![]).await, json!(0));

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_single_time_update_checked_against_stored_row() {
      let (mutations, _temp) = create_test_mutations().await;
      let id = mutations.create_event(standup()).await.unwrap();
      let pending = mutations.store().pending_transaction_count().await.unwrap();

      let late_start = EventUpdate {
         start_time: Some(datetime!(2026-02-15 12:00 UTC)),
         ..Default::default()
      };
      assert!(matches!(mutations.update_event(&id, late_start).await, Err(Error::Validation(_))));

      let early_end = EventUpdate {
         end_time: Some(datetime!(2026-02-15 09:00 UTC)),
         ..Default::default()
      };
      assert!(matches!(mutations.update_event(&id, early_end).await, Err(Error::Validation(_))));

      assert_eq!(
         scalar(&mutations, "SELECT start_time || '/' || end_time FROM events WHERE id = ?", vec![json!(id)]).await,
         json!("2026-02-15T10:00:00.000Z/2026-02-15T10:15:00.000Z")
      );
      assert_eq!(mutations.store().pending_transaction_count().await.unwrap(), pending);

      let longer = EventUpdate {
         end_time: Some(datetime!(2026-02-15 11:00 UTC)),
         ..Default::default()
      };
      assert!(mutations.update_event(&id, longer).await.unwrap());

      let missing = EventUpdate {
         start_time: Some(datetime!(2026-02-15 08:00 UTC)),
         ..Default::default()
      };
      assert!(matches!(
         mutations.update_event("missing", missing).await,
         Err(Error::NotFound { table: "events", .. })
      ));

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_update_and_delete_event() {
      let (mutations, _temp) = create_test_mutations().await;
      let id = mutations.create_event(standup()).await.unwrap();
      let first = mutations.store().next_crud_transaction().await.unwrap().unwrap();
      mutations.store().complete_transaction(first.id).await.unwrap();

      let bad = EventUpdate {
         start_time: Some(datetime!(2026-02-16 10:00 UTC)),
         end_time: Some(datetime!(2026-02-15 10:00 UTC)),
         ..Default::default()
      };
      assert!(matches!(mutations.update_event(&id, bad).await, Err(Error::Validation(_))));

      let moved = EventUpdate {
         start_time: Some(datetime!(2026-02-16 10:00 UTC)),
         end_time: Some(datetime!(2026-02-16 11:00 UTC)),
         ..Default::default()
      };
      assert!(mutations.update_event(&id, moved).await.unwrap());

      let patch = mutations.store().next_crud_transaction().await.unwrap().unwrap();
      assert_eq!(patch.crud[0].op, UpdateType::Patch);
      let payload = patch.crud[0].op_data.as_ref().unwrap();
      assert_eq!(payload["start_time"], json!("2026-02-16T10:00:00.000Z"));
      assert!(!payload.contains_key("updated_at"));
      mutations.store().complete_transaction(patch.id).await.unwrap();

      mutations.delete_event(&id).await.unwrap();
      let delete = mutations.store().next_crud_transaction().await.unwrap().unwrap();
      assert_eq!(delete.crud[0].op, UpdateType::Delete);
      assert_eq!(delete.crud[0].id, id);

      mutations.store().remove().await.unwrap();
   }
}
