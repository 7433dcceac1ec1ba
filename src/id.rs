//! Offline identifier generation.
//!
//! Every row created by the mutation layer gets its primary key here, before
//! the write is issued. A parent id is therefore known up front and can be
//! bound into dependent child rows of the same transaction without reading
//! anything back from the store.

use uuid::Uuid;

/// New random (version 4) UUID in lowercase hyphenated form.
pub fn new_id() -> String {
   Uuid::new_v4().hyphenated().to_string()
}
