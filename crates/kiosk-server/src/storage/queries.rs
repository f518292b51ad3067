//! Document queries.

use serde_json::{Map, Value};
use sqlx::Row;

use kiosk_core::StoredDocument;
use kiosk_core::db::{DatabaseError, now_rfc3339, unix_timestamp};

use super::db::DocumentDatabase;

/// Field name the store stamps on every document it accepts.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Collection and field names: ASCII letters, digits, `_` and `-`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Filter value parsed from a query string.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn parse(raw: &str) -> Self {
        if raw == "null" {
            Self::Null
        } else if let Ok(b) = raw.parse::<bool>() {
            Self::Bool(b)
        } else if let Ok(i) = raw.parse::<i64>() {
            Self::Int(i)
        } else if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
            Self::Float(f)
        } else {
            Self::Text(raw.to_string())
        }
    }

    fn raw(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredDocument, DatabaseError> {
    let id: String = row.try_get("id")?;
    let body: String = row.try_get("body")?;
    let fields: Map<String, Value> = serde_json::from_str(&body)
        .map_err(|e| DatabaseError::Query(format!("Corrupt document {id}: {e}")))?;
    Ok(StoredDocument { id, fields })
}

impl DocumentDatabase {
    /// Store a document, assigning its id and server timestamp.
    pub async fn insert_document(
        &self,
        collection: &str,
        mut fields: Map<String, Value>,
    ) -> Result<StoredDocument, DatabaseError> {
        let id = uuid::Uuid::new_v4().to_string();
        fields.insert(TIMESTAMP_FIELD.to_string(), Value::String(now_rfc3339()));
        let body = serde_json::to_string(&fields)
            .map_err(|e| DatabaseError::Query(format!("Failed to encode document: {e}")))?;

        sqlx::query("INSERT INTO documents (id, collection, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(collection)
            .bind(&body)
            .bind(unix_timestamp())
            .execute(self.pool())
            .await?;

        Ok(StoredDocument { id, fields })
    }

    /// All documents of a collection in insertion order.
    pub async fn list_documents(
        &self,
        collection: &str,
    ) -> Result<Vec<StoredDocument>, DatabaseError> {
        let rows = sqlx::query(
            "SELECT id, body FROM documents WHERE collection = ? ORDER BY created_at, rowid",
        )
        .bind(collection)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(decode_row).collect()
    }

    /// Documents of a collection whose top-level `field` equals `value`.
    ///
    /// Non-null values also match their textual form, so `2` finds both
    /// `2` and `"2"`.
    pub async fn find_documents(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<StoredDocument>, DatabaseError> {
        let path = format!("$.{field}");

        let rows = if matches!(value, FieldValue::Null) {
            sqlx::query(
                "SELECT id, body FROM documents \
                 WHERE collection = ? AND json_type(body, ?) = 'null' \
                 ORDER BY created_at, rowid",
            )
            .bind(collection)
            .bind(&path)
            .fetch_all(self.pool())
            .await?
        } else {
            let query = sqlx::query(
                "SELECT id, body FROM documents \
                 WHERE collection = ? AND (json_extract(body, ?) = ? OR json_extract(body, ?) = ?) \
                 ORDER BY created_at, rowid",
            )
            .bind(collection)
            .bind(&path);
            let query = match value {
                FieldValue::Bool(b) => query.bind(i64::from(*b)),
                FieldValue::Int(i) => query.bind(*i),
                FieldValue::Float(f) => query.bind(*f),
                FieldValue::Text(s) => query.bind(s.clone()),
                FieldValue::Null => query.bind(Option::<String>::None),
            };
            query
                .bind(&path)
                .bind(value.raw())
                .fetch_all(self.pool())
                .await?
        };

        rows.iter().map(decode_row).collect()
    }

    pub async fn count_documents(&self, collection: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(self.pool())
            .await?;

        Ok(row.0)
    }
}
