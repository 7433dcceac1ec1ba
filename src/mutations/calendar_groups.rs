use serde_json::json;

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::{GroupRole, GroupType, Table};
use crate::store::RowWrite;
use crate::timestamp;
use crate::Result;

/// True when the group-user row is the group owner's last live owner role.
const OWNER_ROLE_GUARD: &str = "SELECT EXISTS (
   SELECT 1 FROM calendar_group_users gu
   JOIN calendar_groups g ON g.id = gu.calendar_group_id
   WHERE gu.id = ? AND gu.deleted_at IS NULL AND gu.role = 'owner'
     AND g.deleted_at IS NULL AND g.owner_id = gu.user_id
     AND NOT EXISTS (
        SELECT 1 FROM calendar_group_users o
        WHERE o.calendar_group_id = gu.calendar_group_id AND o.user_id = gu.user_id
          AND o.role = 'owner' AND o.deleted_at IS NULL AND o.id <> gu.id
     )
)";

#[derive(Debug, Clone, Default)]
pub struct CalendarGroupUpdate {
   pub name: Option<String>,
   pub group_type: Option<GroupType>,
}

impl Mutations {
   /// Create a group together with its owner's `owner` role.
   pub async fn create_calendar_group(
      &self,
      owner_id: &str,
      name: &str,
      group_type: Option<GroupType>,
   ) -> Result<String> {
      require_text("group name", name)?;
      require_text("owner_id", owner_id)?;

      let group_id = new_id();
      let group_user_id = new_id();
      let now = timestamp::now();
      let group_type = group_type.unwrap_or_default();

      let group = RowWrite::insert(
         Table::CalendarGroups,
         &group_id,
         vec![
            ("owner_id", json!(owner_id)),
            ("name", json!(name)),
            ("type", json!(group_type.as_str())),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );
      let owner = RowWrite::insert(
         Table::CalendarGroupUsers,
         &group_user_id,
         vec![
            ("calendar_group_id", json!(group_id)),
            ("user_id", json!(owner_id)),
            ("role", json!(GroupRole::Owner.as_str())),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![group, owner]).await?;
      Ok(group_id)
   }

   pub async fn update_calendar_group(&self, id: &str, update: CalendarGroupUpdate) -> Result<bool> {
      if let Some(name) = &update.name {
         require_text("group name", name)?;
      }

      let builder = UpdateBuilder::new(Table::CalendarGroups)
         .set_opt("name", update.name)
         .set_opt("type", update.group_type.map(String::from));
      self.apply_update(builder, id).await
   }

   pub async fn delete_calendar_group(&self, id: &str) -> Result<()> {
      self.delete(Table::CalendarGroups, id).await
   }

   pub async fn add_group_user(&self, group_id: &str, user_id: &str, role: GroupRole) -> Result<String> {
      require_text("calendar_group_id", group_id)?;
      require_text("user_id", user_id)?;

      let id = new_id();
      let now = timestamp::now();
      let write = RowWrite::insert(
         Table::CalendarGroupUsers,
         &id,
         vec![
            ("calendar_group_id", json!(group_id)),
            ("user_id", json!(user_id)),
            ("role", json!(role.as_str())),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   /// Remove a user from a group. The owner's last owner role in a live
   /// group cannot be removed.
   pub async fn remove_group_user(&self, id: &str) -> Result<()> {
      let write = RowWrite::soft_delete(Table::CalendarGroupUsers, id, &timestamp::now()).with_guard(
         OWNER_ROLE_GUARD,
         vec![json!(id)],
         "the group owner's owner role cannot be removed",
      );
      self.commit(vec![write]).await
   }

   pub async fn add_calendar_to_group(
      &self,
      group_id: &str,
      calendar_id: &str,
      view_mode: Option<&str>,
   ) -> Result<String> {
      require_text("calendar_group_id", group_id)?;
      require_text("calendar_id", calendar_id)?;

      let id = new_id();
      let now = timestamp::now();
      let write = RowWrite::insert(
         Table::CalendarGroupMemberships,
         &id,
         vec![
            ("calendar_group_id", json!(group_id)),
            ("calendar_id", json!(calendar_id)),
            ("view_mode", json!(view_mode)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![write]).await?;
      Ok(id)
   }

   pub async fn remove_calendar_from_group(&self, id: &str) -> Result<()> {
      self.delete(Table::CalendarGroupMemberships, id).await
   }
}
