use serde_json::json;

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::Table;
use crate::store::RowWrite;
use crate::timestamp;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct NewUser {
   pub first_name: String,
   pub last_name: String,
   pub email: String,
   pub username: Option<String>,
   pub display_name: Option<String>,
   pub primary_calendar_group_id: Option<String>,
}

/// Partial user update. `None` leaves a column unchanged; for nullable
/// columns `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
   pub first_name: Option<String>,
   pub last_name: Option<String>,
   pub email: Option<String>,
   pub username: Option<Option<String>>,
   pub display_name: Option<Option<String>>,
   pub primary_calendar_group_id: Option<Option<String>>,
}

impl Mutations {
   pub async fn create_user(&self, user: NewUser) -> Result<String> {
      require_text("email", &user.email)?;

      let id = new_id();
      let now = timestamp::now();
      let write = RowWrite::insert(
         Table::Users,
         &id,
         vec![
            ("first_name", json!(user.first_name)),
            ("last_name", json!(user.last_name)),
            ("email", json!(user.email)),
            ("username", json!(user.username)),
            ("display_name", json!(user.display_name)),
            ("primary_calendar_group_id", json!(user.primary_calendar_group_id)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   pub async fn update_user(&self, id: &str, update: UserUpdate) -> Result<bool> {
      let builder = UpdateBuilder::new(Table::Users)
         .set_opt("first_name", update.first_name)
         .set_opt("last_name", update.last_name)
         .set_opt("email", update.email)
         .set_nullable("username", update.username)
         .set_nullable("display_name", update.display_name)
         .set_nullable("primary_calendar_group_id", update.primary_calendar_group_id);
      self.apply_update(builder, id).await
   }

   /// Users have no `deleted_at` locally, so the row is removed.
   pub async fn delete_user(&self, id: &str) -> Result<()> {
      self.delete(Table::Users, id).await
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::mutations::test_support::{create_test_mutations, scalar};
   use crate::Error;

   fn alice() -> NewUser {
      NewUser {
         first_name: "Alice".into(),
         last_name: "Liddell".into(),
         email: "alice@example.com".into(),
         ..Default::default()
      }
   }

   #[tokio::test]
   async fn test_create_update_delete_user() {
      let (mutations, _temp) = create_test_mutations().await;

      let id = mutations.create_user(alice()).await.unwrap();
      assert_eq!(
         scalar(&mutations, "SELECT email FROM users WHERE id = ?", vec![json!(id)]).await,
         json!("alice@example.com")
      );

      let changed = mutations
         .update_user(
            &id,
            UserUpdate {
               display_name: Some(Some("Al".into())),
               ..Default::default()
            },
         )
         .await
         .unwrap();
      assert!(changed);
      assert_eq!(
         scalar(&mutations, "SELECT display_name FROM users WHERE id = ?", vec![json!(id)]).await,
         json!("Al")
      );

      mutations.delete_user(&id).await.unwrap();
      assert_eq!(scalar(&mutations, "SELECT COUNT(*) FROM users", vec![]).await, json!(0));

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_empty_update_touches_nothing() {
      let (mutations, _temp) = create_test_mutations().await;
      let id = mutations.create_user(alice()).await.unwrap();
      let before = scalar(&mutations, "SELECT updated_at FROM users WHERE id = ?", vec![json!(id)]).await;

      let changed = mutations.update_user(&id, UserUpdate::default()).await.unwrap();

      assert!(!changed);
      assert_eq!(
         scalar(&mutations, "SELECT updated_at FROM users WHERE id = ?", vec![json!(id)]).await,
         before
      );
      assert_eq!(mutations.store().pending_transaction_count().await.unwrap(), 1);

      // Even for an id that does not exist
      assert!(!mutations.update_user("missing", UserUpdate::default()).await.unwrap());

      mutations.store().remove().await.unwrap();
   }

   #[tokio::test]
   async fn test_delete_missing_user() {
      let (mutations, _temp) = create_test_mutations().await;
      let err = mutations.delete_user("missing").await.unwrap_err();
      assert!(matches!(err, Error::NotFound { table: "users", .. }));
      mutations.store().remove().await.unwrap();
   }
}
