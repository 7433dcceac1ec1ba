//! Entity tables, row types and the local DDL.
//!
//! Every entity row carries `id`, `inserted_at` and `updated_at`. Tables with
//! a `deleted_at` column are soft-deleted and every read filters on
//! `deleted_at IS NULL`. `users` has no `deleted_at` on the client (the
//! column is never replicated) and is removed outright.
//!
//! No SQL foreign keys are declared: replicated rows arrive in whatever order
//! the sync stream delivers them, so referential rules are enforced by the
//! mutation layer instead.

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use time::OffsetDateTime;
use tracing::debug;

use crate::Result;
use crate::timestamp::parse_timestamp;

/// Local change-queue header table: one row per queued change-set.
pub const CRUD_TRANSACTIONS: &str = "crud_transactions";
/// Local change-queue entries, ordered within their change-set.
pub const CRUD_ENTRIES: &str = "crud_entries";

/// Columns the server owns. Written locally for immediate display, never uploaded.
pub(crate) const LOCAL_TIMESTAMP_COLUMNS: [&str; 2] = ["inserted_at", "updated_at"];

/// How a table's rows are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
   /// Set `deleted_at`; the row stays for replication and history.
   Soft,
   /// Remove the row.
   Hard,
}

/// Replicated entity tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
   Users,
   Calendars,
   CalendarMembers,
   CalendarGroups,
   CalendarGroupUsers,
   CalendarGroupMemberships,
   Events,
   EventResponses,
}

impl Table {
   pub const ALL: [Table; 8] = [
      Table::Users,
      Table::Calendars,
      Table::CalendarMembers,
      Table::CalendarGroups,
      Table::CalendarGroupUsers,
      Table::CalendarGroupMemberships,
      Table::Events,
      Table::EventResponses,
   ];

   pub fn name(self) -> &'static str {
      match self {
         Table::Users => "users",
         Table::Calendars => "calendars",
         Table::CalendarMembers => "calendar_members",
         Table::CalendarGroups => "calendar_groups",
         Table::CalendarGroupUsers => "calendar_group_users",
         Table::CalendarGroupMemberships => "calendar_group_memberships",
         Table::Events => "events",
         Table::EventResponses => "event_responses",
      }
   }

   pub fn from_name(name: &str) -> Option<Table> {
      Table::ALL.into_iter().find(|t| t.name() == name)
   }

   /// Column names in declaration order, `id` first.
   pub fn columns(self) -> &'static [&'static str] {
      match self {
         Table::Users => &[
            "id",
            "first_name",
            "last_name",
            "email",
            "username",
            "display_name",
            "primary_calendar_group_id",
            "inserted_at",
            "updated_at",
         ],
         Table::Calendars => &[
            "id",
            "owner_id",
            "type",
            "name",
            "description",
            "rsvp_enabled",
            "discoverable",
            "default_view_mode",
            "household_sharing",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::CalendarMembers => &[
            "id",
            "calendar_id",
            "user_id",
            "role_id",
            "view_mode",
            "can_delete_events",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::CalendarGroups => &[
            "id",
            "owner_id",
            "name",
            "type",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::CalendarGroupUsers => &[
            "id",
            "calendar_group_id",
            "user_id",
            "role",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::CalendarGroupMemberships => &[
            "id",
            "calendar_group_id",
            "calendar_id",
            "view_mode",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::Events => &[
            "id",
            "calendar_id",
            "created_by_user_id",
            "title",
            "description",
            "start_time",
            "end_time",
            "is_recurring",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
         Table::EventResponses => &[
            "id",
            "event_id",
            "user_id",
            "status",
            "responded_at",
            "deleted_at",
            "inserted_at",
            "updated_at",
         ],
      }
   }

   pub fn has_column(self, column: &str) -> bool {
      self.columns().contains(&column)
   }

   pub fn delete_policy(self) -> DeletePolicy {
      if self.has_column("deleted_at") {
         DeletePolicy::Soft
      } else {
         DeletePolicy::Hard
      }
   }

   /// Predicate selecting live rows of this table.
   pub fn active_predicate(self) -> &'static str {
      match self.delete_policy() {
         DeletePolicy::Soft => "deleted_at IS NULL",
         DeletePolicy::Hard => "1",
      }
   }

   fn ddl(self) -> &'static str {
      match self {
         Table::Users => {
            "CREATE TABLE IF NOT EXISTS users (
               id TEXT PRIMARY KEY NOT NULL,
               first_name TEXT,
               last_name TEXT,
               email TEXT,
               username TEXT,
               display_name TEXT,
               primary_calendar_group_id TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::Calendars => {
            "CREATE TABLE IF NOT EXISTS calendars (
               id TEXT PRIMARY KEY NOT NULL,
               owner_id TEXT NOT NULL,
               type TEXT NOT NULL,
               name TEXT NOT NULL,
               description TEXT,
               rsvp_enabled INTEGER NOT NULL DEFAULT 1,
               discoverable INTEGER NOT NULL DEFAULT 0,
               default_view_mode TEXT,
               household_sharing INTEGER NOT NULL DEFAULT 1,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::CalendarMembers => {
            "CREATE TABLE IF NOT EXISTS calendar_members (
               id TEXT PRIMARY KEY NOT NULL,
               calendar_id TEXT NOT NULL,
               user_id TEXT NOT NULL,
               role_id TEXT,
               view_mode TEXT,
               can_delete_events INTEGER NOT NULL DEFAULT 0,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::CalendarGroups => {
            "CREATE TABLE IF NOT EXISTS calendar_groups (
               id TEXT PRIMARY KEY NOT NULL,
               owner_id TEXT NOT NULL,
               name TEXT NOT NULL,
               type TEXT NOT NULL DEFAULT 'personal',
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::CalendarGroupUsers => {
            "CREATE TABLE IF NOT EXISTS calendar_group_users (
               id TEXT PRIMARY KEY NOT NULL,
               calendar_group_id TEXT NOT NULL,
               user_id TEXT NOT NULL,
               role TEXT NOT NULL,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::CalendarGroupMemberships => {
            "CREATE TABLE IF NOT EXISTS calendar_group_memberships (
               id TEXT PRIMARY KEY NOT NULL,
               calendar_group_id TEXT NOT NULL,
               calendar_id TEXT NOT NULL,
               view_mode TEXT,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::Events => {
            "CREATE TABLE IF NOT EXISTS events (
               id TEXT PRIMARY KEY NOT NULL,
               calendar_id TEXT NOT NULL,
               created_by_user_id TEXT,
               title TEXT NOT NULL,
               description TEXT,
               start_time TEXT NOT NULL,
               end_time TEXT NOT NULL,
               is_recurring INTEGER NOT NULL DEFAULT 0,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
         Table::EventResponses => {
            "CREATE TABLE IF NOT EXISTS event_responses (
               id TEXT PRIMARY KEY NOT NULL,
               event_id TEXT NOT NULL,
               user_id TEXT NOT NULL,
               status TEXT NOT NULL DEFAULT 'pending',
               responded_at TEXT,
               deleted_at TEXT,
               inserted_at TEXT,
               updated_at TEXT
            )"
         }
      }
   }
}

const INDEXES: &[&str] = &[
   "CREATE INDEX IF NOT EXISTS calendar_members_calendar_id ON calendar_members (calendar_id)",
   "CREATE INDEX IF NOT EXISTS calendar_group_users_group_id ON calendar_group_users (calendar_group_id)",
   "CREATE INDEX IF NOT EXISTS calendar_group_memberships_group_id ON calendar_group_memberships (calendar_group_id)",
   "CREATE INDEX IF NOT EXISTS events_calendar_id ON events (calendar_id)",
   "CREATE INDEX IF NOT EXISTS events_start_time ON events (start_time)",
   "CREATE INDEX IF NOT EXISTS event_responses_event_id ON event_responses (event_id)",
];

const QUEUE_DDL: &[&str] = &[
   "CREATE TABLE IF NOT EXISTS crud_transactions (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      created_at TEXT NOT NULL
   )",
   "CREATE TABLE IF NOT EXISTS crud_entries (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      tx_id INTEGER NOT NULL,
      op TEXT NOT NULL,
      table_name TEXT NOT NULL,
      row_id TEXT NOT NULL,
      data TEXT
   )",
   "CREATE INDEX IF NOT EXISTS crud_entries_tx_id ON crud_entries (tx_id, id)",
];

/// Create every table and index that does not exist yet, in one transaction.
pub(crate) async fn create_schema(conn: &mut SqliteConnection) -> Result<()> {
   sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

   let result = async {
      for table in Table::ALL {
         sqlx::query(table.ddl()).execute(&mut *conn).await?;
      }
      for statement in INDEXES.iter().chain(QUEUE_DDL) {
         sqlx::query(statement).execute(&mut *conn).await?;
      }
      Ok::<(), sqlx::Error>(())
   }
   .await;

   match result {
      Ok(()) => {
         sqlx::query("COMMIT").execute(&mut *conn).await?;
         debug!(tables = Table::ALL.len(), "Schema ready");
         Ok(())
      }
      Err(e) => {
         // Report the DDL failure, not a secondary rollback failure
         let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
         Err(e.into())
      }
   }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Calendar visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarType {
   Private,
   Shared,
   Public,
}

impl CalendarType {
   pub fn as_str(self) -> &'static str {
      match self {
         CalendarType::Private => "private",
         CalendarType::Shared => "shared",
         CalendarType::Public => "public",
      }
   }
}

/// Calendar group kind. Unknown kinds from the server are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GroupType {
   #[default]
   Personal,
   Household,
   Other(String),
}

impl GroupType {
   pub fn as_str(&self) -> &str {
      match self {
         GroupType::Personal => "personal",
         GroupType::Household => "household",
         GroupType::Other(other) => other,
      }
   }
}

impl From<String> for GroupType {
   fn from(value: String) -> Self {
      match value.as_str() {
         "personal" => GroupType::Personal,
         "household" => GroupType::Household,
         _ => GroupType::Other(value),
      }
   }
}

impl From<GroupType> for String {
   fn from(value: GroupType) -> Self {
      value.as_str().to_string()
   }
}

/// Role of a user inside a calendar group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
   Owner,
   Member,
}

impl GroupRole {
   pub fn as_str(self) -> &'static str {
      match self {
         GroupRole::Owner => "owner",
         GroupRole::Member => "member",
      }
   }
}

/// RSVP state of an event response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsvpStatus {
   #[default]
   Pending,
   Accepted,
   Declined,
   Tentative,
}

impl RsvpStatus {
   pub fn as_str(self) -> &'static str {
      match self {
         RsvpStatus::Pending => "pending",
         RsvpStatus::Accepted => "accepted",
         RsvpStatus::Declined => "declined",
         RsvpStatus::Tentative => "tentative",
      }
   }
}

// ============================================================================
// Row types
// ============================================================================

/// SQLite has no boolean storage class; flags come back as 0/1 (or NULL).
mod int_bool {
   use serde::{Deserialize, Deserializer};

   #[derive(Deserialize)]
   #[serde(untagged)]
   enum Raw {
      Bool(bool),
      Int(i64),
   }

   pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
      Ok(match Option::<Raw>::deserialize(deserializer)? {
         Some(Raw::Bool(b)) => b,
         Some(Raw::Int(i)) => i != 0,
         None => false,
      })
   }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
   pub id: String,
   pub first_name: Option<String>,
   pub last_name: Option<String>,
   pub email: Option<String>,
   #[serde(default)]
   pub username: Option<String>,
   pub display_name: Option<String>,
   #[serde(default)]
   pub primary_calendar_group_id: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calendar {
   pub id: String,
   pub owner_id: String,
   #[serde(rename = "type")]
   pub calendar_type: CalendarType,
   pub name: String,
   pub description: Option<String>,
   #[serde(deserialize_with = "int_bool::deserialize")]
   pub rsvp_enabled: bool,
   #[serde(deserialize_with = "int_bool::deserialize")]
   pub discoverable: bool,
   pub default_view_mode: Option<String>,
   #[serde(deserialize_with = "int_bool::deserialize")]
   pub household_sharing: bool,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarMember {
   pub id: String,
   pub calendar_id: String,
   pub user_id: String,
   pub role_id: Option<String>,
   pub view_mode: Option<String>,
   #[serde(deserialize_with = "int_bool::deserialize")]
   pub can_delete_events: bool,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarGroup {
   pub id: String,
   pub owner_id: String,
   pub name: String,
   #[serde(rename = "type")]
   pub group_type: GroupType,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarGroupUser {
   pub id: String,
   pub calendar_group_id: String,
   pub user_id: String,
   pub role: GroupRole,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarGroupMembership {
   pub id: String,
   pub calendar_group_id: String,
   pub calendar_id: String,
   pub view_mode: Option<String>,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
   pub id: String,
   pub calendar_id: String,
   pub created_by_user_id: Option<String>,
   pub title: String,
   pub description: Option<String>,
   pub start_time: String,
   pub end_time: String,
   #[serde(deserialize_with = "int_bool::deserialize")]
   pub is_recurring: bool,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}

impl Event {
   pub fn starts_at(&self) -> Option<OffsetDateTime> {
      parse_timestamp(&self.start_time)
   }

   pub fn ends_at(&self) -> Option<OffsetDateTime> {
      parse_timestamp(&self.end_time)
   }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResponse {
   pub id: String,
   pub event_id: String,
   pub user_id: String,
   pub status: RsvpStatus,
   pub responded_at: Option<String>,
   pub deleted_at: Option<String>,
   pub inserted_at: Option<String>,
   pub updated_at: Option<String>,
}
