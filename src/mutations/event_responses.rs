use serde_json::{Value as JsonValue, json};

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::{RsvpStatus, Table};
use crate::store::RowWrite;
use crate::timestamp;
use crate::Result;

/// `responded_at` for a status change made at `now`: pending means "not answered".
fn responded_at(status: RsvpStatus, now: &str) -> JsonValue {
   match status {
      RsvpStatus::Pending => JsonValue::Null,
      _ => json!(now),
   }
}

impl Mutations {
   pub async fn create_event_response(
      &self,
      event_id: &str,
      user_id: &str,
      status: Option<RsvpStatus>,
   ) -> Result<String> {
      require_text("event_id", event_id)?;
      require_text("user_id", user_id)?;

      let id = new_id();
      let now = timestamp::now();
      let status = status.unwrap_or_default();
      let write = RowWrite::insert(
         Table::EventResponses,
         &id,
         vec![
            ("event_id", json!(event_id)),
            ("user_id", json!(user_id)),
            ("status", json!(status.as_str())),
            ("responded_at", responded_at(status, &now)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   /// Change an RSVP. `responded_at` is recomputed from the new status.
   pub async fn update_event_response(&self, id: &str, status: RsvpStatus) -> Result<()> {
      let now = timestamp::now();
      let builder = UpdateBuilder::new(Table::EventResponses)
         .set("status", status.as_str())
         .set("responded_at", responded_at(status, &now));
      self.apply_update(builder, id).await?;
      Ok(())
   }

   pub async fn delete_event_response(&self, id: &str) -> Result<()> {
      self.delete(Table::EventResponses, id).await
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::mutations::test_support::{create_test_mutations, scalar};

   #[tokio::test]
   async fn test_pending_response_has_no_responded_at() {
      let (mutations, _temp) = create_test_mutations().await;

      let id = mutations
         .create_event_response("evt-1", "user-1", None)
         .await
         .unwrap();

      assert_eq!(
         scalar(&mutations, "SELECT status FROM event_responses WHERE id = ?", vec![json!(id)]).await,
         json!("pending")
      );
      assert_eq!(
         scalar(&mutations, "SELECT responded_at FROM event_responses WHERE id = ?", vec![json!(id)]).await,
         JsonValue::Null
      );

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_responded_at_follows_status() {
      let (mutations, _temp) = create_test_mutations().await;
      let id = mutations
         .create_event_response("evt-1", "user-1", Some(RsvpStatus::Accepted))
         .await
         .unwrap();
      assert!(
         scalar(&mutations, "SELECT responded_at FROM event_responses WHERE id = ?", vec![json!(id)])
            .await
            .is_string()
      );

      mutations
         .update_event_response(&id, RsvpStatus::Pending)
         .await
         .unwrap();
      assert_eq!(
         scalar(&mutations, "SELECT responded_at FROM event_responses WHERE id = ?", vec![json!(id)]).await,
         JsonValue::Null
      );

      mutations
         .update_event_response(&id, RsvpStatus::Tentative)
         .await
         .unwrap();
      assert_eq!(
         scalar(&mutations, "SELECT status FROM event_responses WHERE id = ?", vec![json!(id)]).await,
         json!("tentative")
      );

      mutations.delete_event_response(&id).await.unwrap();
      assert!(mutations.update_event_response(&id, RsvpStatus::Declined).await.is_err());

      mutations.store().remove().await.unwrap();
   }
}
