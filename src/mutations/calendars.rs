use serde_json::json;

use super::{Mutations, UpdateBuilder, require_text};
use crate::id::new_id;
use crate::schema::{CalendarType, Table};
use crate::store::RowWrite;
use crate::timestamp;
use crate::Result;

/// View mode given to new calendars.
pub const DEFAULT_VIEW_MODE: &str = "full";

#[derive(Debug, Clone)]
pub struct NewCalendar {
   pub owner_id: String,
   pub calendar_type: CalendarType,
   pub name: String,
   pub description: Option<String>,
}

/// Settings a calendar starts with, derived from its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarDefaults {
   pub rsvp_enabled: bool,
   pub discoverable: bool,
   pub household_sharing: bool,
   pub default_view_mode: &'static str,
}

impl CalendarDefaults {
   pub fn for_type(calendar_type: CalendarType) -> Self {
      Self {
         rsvp_enabled: calendar_type != CalendarType::Private,
         discoverable: calendar_type == CalendarType::Public,
         household_sharing: true,
         default_view_mode: DEFAULT_VIEW_MODE,
      }
   }
}

#[derive(Debug, Clone, Default)]
pub struct CalendarUpdate {
   pub name: Option<String>,
   pub description: Option<Option<String>>,
   pub rsvp_enabled: Option<bool>,
   pub discoverable: Option<bool>,
   pub default_view_mode: Option<Option<String>>,
   pub household_sharing: Option<bool>,
}

impl Mutations {
   /// Create a calendar together with its owner's membership.
   ///
   /// The owner member row gets `owner_role_id` and may delete events.
   pub async fn create_calendar(&self, calendar: NewCalendar, owner_role_id: &str) -> Result<String> {
      require_text("calendar name", &calendar.name)?;
      require_text("owner_id", &calendar.owner_id)?;

      let calendar_id = new_id();
      let member_id = new_id();
      let now = timestamp::now();
      let defaults = CalendarDefaults::for_type(calendar.calendar_type);

      let calendar_row = RowWrite::insert(
         Table::Calendars,
         &calendar_id,
         vec![
            ("owner_id", json!(calendar.owner_id)),
            ("type", json!(calendar.calendar_type.as_str())),
            ("name", json!(calendar.name)),
            ("description", json!(calendar.description)),
            ("rsvp_enabled", json!(defaults.rsvp_enabled)),
            ("discoverable", json!(defaults.discoverable)),
            ("default_view_mode", json!(defaults.default_view_mode)),
            ("household_sharing", json!(defaults.household_sharing)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );
      let owner_member = RowWrite::insert(
         Table::CalendarMembers,
         &member_id,
         vec![
            ("calendar_id", json!(calendar_id)),
            ("user_id", json!(calendar.owner_id)),
            ("role_id", json!(owner_role_id)),
            ("can_delete_events", json!(true)),
            ("inserted_at", json!(now)),
            ("updated_at", json!(now)),
         ],
      );

      self.commit(vec![calendar_row, owner_member]).await?;
      Ok(calendar_id)
   }

   pub async fn update_calendar(&self, id: &str, update: CalendarUpdate) -> Result<bool> {
      if let Some(name) = &update.name {
         require_text("calendar name", name)?;
      }

      let builder = UpdateBuilder::new(Table::Calendars)
         .set_opt("name", update.name)
         .set_nullable("description", update.description)
         .set_opt("rsvp_enabled", update.rsvp_enabled)
         .set_opt("discoverable", update.discoverable)
         .set_nullable("default_view_mode", update.default_view_mode)
         .set_opt("household_sharing", update.household_sharing);
      self.apply_update(builder, id).await
   }

   pub async fn delete_calendar(&self, id: &str) -> Result<()> {
      self.delete(Table::Calendars, id).await
   }
}
