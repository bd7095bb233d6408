//! Audit repository: the append-only `audit_entries` table.
//!
//! Rows are never updated or deleted; triggers in the schema abort any
//! attempt. `seq` gives the append order.

use rusqlite::{params, Row};
use serde::Serialize;
use serde_json::Value;

use super::{now_rfc3339, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A user-supplied field change.
    Correction,
    /// A derived field changed as a consequence of a correction.
    Recompute,
    Rollback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Correction => "correction",
            AuditAction::Recompute => "recompute",
            AuditAction::Rollback => "rollback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "correction" => Some(AuditAction::Correction),
            "recompute" => Some(AuditAction::Recompute),
            "rollback" => Some(AuditAction::Rollback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub document_id: String,
    pub timestamp: String,
    pub action: AuditAction,
    pub field_name: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub user_id: String,
    pub reason: Option<String>,
}

/// An entry about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub action: AuditAction,
    pub field_name: Option<String>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub user_id: String,
    pub reason: Option<String>,
}

impl NewAuditEntry {
    pub fn field(
        action: AuditAction,
        field_name: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
        user_id: &str,
    ) -> Self {
        Self {
            action,
            field_name: Some(field_name.to_string()),
            old_value,
            new_value,
            user_id: user_id.to_string(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<&str>) -> Self {
        self.reason = reason.map(|r| r.to_string());
        self
    }
}

fn encode(value: &Option<Value>) -> Result<Option<String>, DatabaseError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|source| DatabaseError::Json {
            column: "audit_value",
            source,
        })
}

fn decode(text: Option<String>) -> Result<Option<Value>, rusqlite::Error> {
    text.map(|t| {
        serde_json::from_str(&t).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn from_row(row: &Row<'_>) -> Result<AuditEntry, rusqlite::Error> {
    let action: String = row.get("action")?;
    let action = AuditAction::parse(&action).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown audit action '{}'", action).into(),
        )
    })?;
    Ok(AuditEntry {
        seq: row.get("seq")?,
        document_id: row.get("document_id")?,
        timestamp: row.get("timestamp")?,
        action,
        field_name: row.get("field_name")?,
        old_value: decode(row.get("old_value")?)?,
        new_value: decode(row.get("new_value")?)?,
        user_id: row.get("user_id")?,
        reason: row.get("reason")?,
    })
}

/// Appends `entries` for `document_id` in order, all or nothing.
pub fn append_all(
    db: &Database,
    document_id: &str,
    entries: &[NewAuditEntry],
) -> Result<(), DatabaseError> {
    if entries.is_empty() {
        return Ok(());
    }
    let timestamp = now_rfc3339();
    db.with_tx(|tx| {
        let mut stmt = tx.prepare(
            "INSERT INTO audit_entries
             (document_id, timestamp, action, field_name, old_value, new_value, user_id, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for entry in entries {
            stmt.execute(params![
                document_id,
                timestamp,
                entry.action.as_str(),
                entry.field_name,
                encode(&entry.old_value)?,
                encode(&entry.new_value)?,
                entry.user_id,
                entry.reason,
            ])?;
        }
        Ok(())
    })
}

pub fn append(db: &Database, document_id: &str, entry: &NewAuditEntry) -> Result<(), DatabaseError> {
    append_all(db, document_id, std::slice::from_ref(entry))
}

/// Entries of one document in append order.
pub fn list_for_document(db: &Database, document_id: &str) -> Result<Vec<AuditEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM audit_entries WHERE document_id = ?1 ORDER BY seq ASC")?;
        let rows = stmt
            .query_map(params![document_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::document_repo;
    use crate::document::Document;
    use serde_json::json;
    use std::path::PathBuf;

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let doc = Document::new("u1", "a.pdf", PathBuf::from("/a.pdf"), "application/pdf", 1);
        document_repo::insert(&db, &doc).unwrap();
        (db, doc.id)
    }

    #[test]
    fn test_append_preserves_order() {
        let (db, id) = setup();
        append_all(
            &db,
            &id,
            &[
                NewAuditEntry::field(AuditAction::Correction, "amount_tax", Some(json!(1.0)), Some(json!(2.0)), "alice")
                    .with_reason(Some("typo")),
                NewAuditEntry::field(AuditAction::Recompute, "total_amount", Some(json!(11.0)), Some(json!(12.0)), "alice"),
            ],
        )
        .unwrap();
        append(
            &db,
            &id,
            &NewAuditEntry {
                action: AuditAction::Rollback,
                field_name: None,
                old_value: Some(json!({"amount_tax": 2.0})),
                new_value: Some(json!({"amount_tax": 1.0})),
                user_id: "bob".to_string(),
                reason: None,
            },
        )
        .unwrap();

        let entries = list_for_document(&db, &id).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Correction, AuditAction::Recompute, AuditAction::Rollback]
        );
        assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));
        assert_eq!(entries[0].reason.as_deref(), Some("typo"));
        assert_eq!(entries[1].new_value, Some(json!(12.0)));
        assert!(entries[2].field_name.is_none());
    }

    #[test]
    fn test_entries_cannot_be_changed() {
        let (db, id) = setup();
        append(
            &db,
            &id,
            &NewAuditEntry::field(AuditAction::Correction, "currency", None, Some(json!("EUR")), "alice"),
        )
        .unwrap();

        let update = db.with_conn(|conn| {
            conn.execute("UPDATE audit_entries SET user_id = 'mallory'", [])?;
            Ok(())
        });
        assert!(update.is_err());
        let delete = db.with_conn(|conn| {
            conn.execute("DELETE FROM audit_entries", [])?;
            Ok(())
        });
        assert!(delete.is_err());
        assert_eq!(list_for_document(&db, &id).unwrap().len(), 1);
    }
}
