//! Named queries used by the application screens.

use super::Query;
use crate::auth::AuthSession;
use crate::schema::{
   Calendar, CalendarGroup, CalendarGroupMembership, CalendarMember, Event, EventResponse, Table,
   User,
};

pub fn users() -> Query<User> {
   Query::new("SELECT * FROM users ORDER BY inserted_at DESC", Vec::new(), vec![Table::Users])
}

pub fn user(id: Option<&str>) -> Query<User> {
   Query::scoped(Table::Users, "SELECT * FROM users WHERE id = ?", id)
}

/// Local profile row of the signed-in user. Matches nothing while signed
/// out, and may be empty until the first sync brings the row down.
pub fn current_user(session: &AuthSession) -> Query<User> {
   user(session.user_id().as_deref())
}

pub fn calendars() -> Query<Calendar> {
   Query::new(
      "SELECT * FROM calendars WHERE deleted_at IS NULL ORDER BY name ASC",
      Vec::new(),
      vec![Table::Calendars],
   )
}

pub fn calendar(id: Option<&str>) -> Query<Calendar> {
   Query::scoped(
      Table::Calendars,
      "SELECT * FROM calendars WHERE id = ? AND deleted_at IS NULL",
      id,
   )
}

pub fn calendar_members(calendar_id: Option<&str>) -> Query<CalendarMember> {
   Query::scoped(
      Table::CalendarMembers,
      "SELECT * FROM calendar_members WHERE calendar_id = ? AND deleted_at IS NULL ORDER BY inserted_at ASC",
      calendar_id,
   )
}

pub fn calendar_groups() -> Query<CalendarGroup> {
   Query::new(
      "SELECT * FROM calendar_groups WHERE deleted_at IS NULL ORDER BY name ASC",
      Vec::new(),
      vec![Table::CalendarGroups],
   )
}

pub fn calendar_group(id: Option<&str>) -> Query<CalendarGroup> {
   Query::scoped(
      Table::CalendarGroups,
      "SELECT * FROM calendar_groups WHERE id = ? AND deleted_at IS NULL",
      id,
   )
}

pub fn calendar_group_memberships(group_id: Option<&str>) -> Query<CalendarGroupMembership> {
   Query::scoped(
      Table::CalendarGroupMemberships,
      "SELECT * FROM calendar_group_memberships WHERE calendar_group_id = ? AND deleted_at IS NULL",
      group_id,
   )
}

pub fn events_for_calendar(calendar_id: Option<&str>) -> Query<Event> {
   Query::scoped(
      Table::Events,
      "SELECT * FROM events WHERE calendar_id = ? AND deleted_at IS NULL ORDER BY julianday(start_time) ASC",
      calendar_id,
   )
}

pub fn event_responses(event_id: Option<&str>) -> Query<EventResponse> {
   Query::scoped(
      Table::EventResponses,
      "SELECT * FROM event_responses WHERE event_id = ? AND deleted_at IS NULL",
      event_id,
   )
}
