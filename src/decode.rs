//! SQLite value to JSON decoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Row, Sqlite, TypeInfo, ValueRef};

use crate::{Error, Result};

/// A decoded row, columns in select order.
pub type JsonRow = IndexMap<String, JsonValue>;

/// Convert one SQLite value to JSON.
///
/// Blobs are base64 encoded. Non-finite reals become `null`.
pub(crate) fn to_json(value: SqliteValueRef<'_>) -> Result<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = value.type_info().name().to_string();
   match type_name.as_str() {
      "TEXT" | "DATE" | "TIME" | "DATETIME" => {
         let text = <String as Decode<Sqlite>>::decode(value).map_err(sqlx::Error::Decode)?;
         Ok(JsonValue::String(text))
      }
      "INTEGER" | "BOOLEAN" | "INT8" => {
         let int = <i64 as Decode<Sqlite>>::decode(value).map_err(sqlx::Error::Decode)?;
         Ok(JsonValue::from(int))
      }
      "REAL" | "NUMERIC" => {
         let real = <f64 as Decode<Sqlite>>::decode(value).map_err(sqlx::Error::Decode)?;
         Ok(serde_json::Number::from_f64(real)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null))
      }
      "BLOB" => {
         let bytes = <Vec<u8> as Decode<Sqlite>>::decode(value).map_err(sqlx::Error::Decode)?;
         Ok(JsonValue::String(BASE64.encode(bytes)))
      }
      other => Err(Error::UnsupportedDatatype(other.to_string())),
   }
}

/// Decode SQLite rows to JSON maps.
pub(crate) fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<JsonRow>> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = IndexMap::default();
      for (i, column) in row.columns().iter().enumerate() {
         let v = row.try_get_raw(i)?;
         let v = to_json(v)?;
         value.insert(column.name().to_string(), v);
      }
      values.push(value);
   }
   Ok(values)
}

/// Deserialize a decoded row into a typed record.
pub fn from_row<T: DeserializeOwned>(row: JsonRow) -> Result<T> {
   let object: serde_json::Map<String, JsonValue> = row.into_iter().collect();
   Ok(serde_json::from_value(JsonValue::Object(object))?)
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde::Deserialize;
   use serde_json::json;
   use sqlx::Connection;
   use sqlx::sqlite::SqliteConnection;

   async fn select(sql: &str) -> Vec<JsonRow> {
      let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
      let rows = sqlx::query(sql).fetch_all(&mut conn).await.unwrap();
      decode_rows(rows).unwrap()
   }

   #[tokio::test]
   async fn test_decode_storage_classes() {
      let rows = select("SELECT NULL AS n, 42 AS i, 1.5 AS r, 'hi' AS t, x'01ff' AS b").await;

      assert_eq!(rows.len(), 1);
      let row = &rows[0];
      assert_eq!(row["n"], JsonValue::Null);
      assert_eq!(row["i"], json!(42));
      assert_eq!(row["r"], json!(1.5));
      assert_eq!(row["t"], json!("hi"));
      assert_eq!(row["b"], json!("Af8="));
   }

   #[tokio::test]
   async fn test_decode_preserves_column_order() {
      let rows = select("SELECT 3 AS c, 1 AS a, 2 AS b").await;
      let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
      assert_eq!(keys, vec!["c", "a", "b"]);
   }

   #[test]
   fn test_from_row() {
      #[derive(Deserialize)]
      struct Named {
         id: String,
         count: i64,
      }

      let mut row = JsonRow::default();
      row.insert("id".into(), json!("r1"));
      row.insert("count".into(), json!(7));

      let named: Named = from_row(row).unwrap();
      assert_eq!((named.id.as_str(), named.count), ("r1", 7));
   }

   #[test]
   fn test_from_row_type_mismatch() {
      let mut row = JsonRow::default();
      row.insert("id".into(), json!(1));

      #[derive(Debug, Deserialize)]
      #[allow(dead_code)]
      struct Named {
         id: String,
      }

      assert!(matches!(from_row::<Named>(row), Err(Error::Json(_))));
   }
}
