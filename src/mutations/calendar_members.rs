use serde_json::json;

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::Table;
use crate::store::RowWrite;
use crate::timestamp;
use crate::Result;

/// True when the member row is the calendar owner's last live membership.
const OWNER_MEMBERSHIP_GUARD: &str = "SELECT EXISTS (
   SELECT 1 FROM calendar_members m
   JOIN calendars c ON c.id = m.calendar_id
   WHERE m.id = ? AND m.deleted_at IS NULL
     AND c.deleted_at IS NULL AND c.owner_id = m.user_id
     AND NOT EXISTS (
        SELECT 1 FROM calendar_members o
        WHERE o.calendar_id = m.calendar_id AND o.user_id = m.user_id
          AND o.deleted_at IS NULL AND o.id <> m.id
     )
)";

#[derive(Debug, Clone, Default)]
pub struct CalendarMemberUpdate {
   pub role_id: Option<Option<String>>,
   pub view_mode: Option<Option<String>>,
   pub can_delete_events: Option<bool>,
}

impl Mutations {
   /// Add a user to a calendar. New members cannot delete events.
   pub async fn add_calendar_member(
      &self,
      calendar_id: &str,
      user_id: &str,
      role_id: &str,
      view_mode: Option<&str>,
   ) -> Result<String> {
      require_text("calendar_id", calendar_id)?;
      require_text("user_id", user_id)?;

      let id = new_id();
      let now = timestamp::now();
      let write = RowWrite::insert(
         Table::CalendarMembers,
         &id,
         vec![
            ("calendar_id", json!(calendar_id)),
            ("user_id", json!(user_id)),
            ("role_id", json!(role_id)),
            ("view_mode", json!(view_mode)),
            ("can_delete_events", json!(false)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   pub async fn update_calendar_member(&self, id: &str, update: CalendarMemberUpdate) -> Result<bool> {
      let builder = UpdateBuilder::new(Table::CalendarMembers)
         .set_nullable("role_id", update.role_id)
         .set_nullable("view_mode", update.view_mode)
         .set_opt("can_delete_events", update.can_delete_events);
      self.apply_update(builder, id).await
   }

   /// Remove a membership. The owner's only membership of a live calendar
   /// cannot be removed.
   pub async fn remove_calendar_member(&self, id: &str) -> Result<()> {
      let write = RowWrite::soft_delete(Table::CalendarMembers, id, &timestamp::now()).with_guard(
         OWNER_MEMBERSHIP_GUARD,
         vec![json!(id)],
         "the calendar owner's membership cannot be removed",
      );
      self.commit(vec![write]).await
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::mutations::NewCalendar;
   use crate::mutations::test_support::{create_test_mutations, scalar};
   use crate::schema::CalendarType;
   use crate::Error;

   async fn create_calendar(mutations: &Mutations) -> String {
      mutations
         .create_calendar(
            NewCalendar {
               owner_id: "owner".into(),
               calendar_type: CalendarType::Shared,
               name: "Team".into(),
               description: None,
            },
            "role-owner",
         )
         .await
         .unwrap()
   }

   #[tokio::test]
   async fn test_add_update_remove_member() {
      let (mutations, _temp) = create_test_mutations().await;
      let calendar_id = create_calendar(&mutations).await;

      let member = mutations
         .add_calendar_member(&calendar_id, "guest", "role-viewer", Some("busy"))
         .await
         .unwrap();
      assert_eq!(
         scalar(&mutations, "SELECT can_delete_events FROM calendar_members WHERE id = ?", vec![json!(member)]).await,
         json!(0)
      );

      let changed = mutations
         .update_calendar_member(
            &member,
            CalendarMemberUpdate {
               can_delete_events: Some(true),
               view_mode: Some(None),
               ..Default::default()
            },
         )
         .await
         .unwrap();
      assert!(changed);
      assert_eq!(
         scalar(&mutations, "SELECT view_mode FROM calendar_members WHERE id = ?", vec![json!(member)]).await,
         json!(null)
      );

      mutations.remove_calendar_member(&member).await.unwrap();
      assert_eq!(
         scalar(
            &mutations,
            "SELECT COUNT(*) FROM calendar_members WHERE calendar_id = ? AND deleted_at IS NULL",
            vec![json!(calendar_id)]
         )
         .await,
         json!(1)
      );

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_owner_membership_is_kept() {
      let (mutations, _temp) = create_test_mutations().await;
      let calendar_id = create_calendar(&mutations).await;
      let owner_member = scalar(
         &mutations,
         "SELECT id FROM calendar_members WHERE calendar_id = ?",
         vec![json!(calendar_id)],
      )
      .await;
      let owner_member = owner_member.as_str().unwrap();
      let pending = mutations.store().pending_transaction_count().await.unwrap();

      let err = mutations.remove_calendar_member(owner_member).await.unwrap_err();

      assert!(matches!(err, Error::Validation(_)));
      assert_eq!(mutations.store().pending_transaction_count().await.unwrap(), pending);

      // Once the calendar itself is gone the membership can go too
      mutations.delete_calendar(&calendar_id).await.unwrap();
      mutations.remove_calendar_member(owner_member).await.unwrap();

      mutations.store().remove().await.unwrap();
   }
}
