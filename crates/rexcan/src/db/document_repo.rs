//! Document repository: rows of the `documents` table.
//!
//! Status writes are compare-and-set: each `UPDATE` names the statuses
//! allowed to precede the target, so a write racing an unexpected state
//! changes nothing and reports [`TransitionError::InvalidTransition`].

use std::path::PathBuf;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DatabaseError};
use crate::document::{Document, DocumentStatus, ExtractedData, TransitionError};

impl ToSql for DocumentStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DocumentStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        DocumentStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown document status '{}'", text).into()))
    }
}

fn from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let extracted_json: Option<String> = row.get("extracted_data")?;
    let extracted = match extracted_json {
        Some(json) => Some(serde_json::from_str::<ExtractedData>(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?),
        None => None,
    };
    let file_path: String = row.get("file_path")?;
    let file_size: i64 = row.get("file_size")?;

    Ok(Document {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        batch_id: row.get("batch_id")?,
        filename: row.get("filename")?,
        file_path: PathBuf::from(file_path),
        mime_type: row.get("mime_type")?,
        file_size: file_size.max(0) as u64,
        profile: row.get("profile")?,
        status: row.get("status")?,
        error_message: row.get("error_message")?,
        queue_job_id: row.get("queue_job_id")?,
        external_job_id: row.get("external_job_id")?,
        extracted,
        processed_at: row.get("processed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn encode_extracted(data: &ExtractedData) -> Result<String, DatabaseError> {
    serde_json::to_string(data).map_err(|source| DatabaseError::Json {
        column: "extracted_data",
        source,
    })
}

/// `IN (...)` list of the statuses that may precede `to`.
fn predecessor_list(to: DocumentStatus) -> String {
    DocumentStatus::predecessors(to)
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs a status-changing statement and turns "no row changed" into the
/// matching transition error.
fn compare_and_set<P: rusqlite::Params>(
    db: &Database,
    id: &str,
    to: DocumentStatus,
    sql: &str,
    params: P,
) -> Result<(), TransitionError> {
    let outcome = db.with_conn(|conn| {
        let changed = conn.execute(sql, params)?;
        if changed > 0 {
            return Ok(None);
        }
        let current: Option<DocumentStatus> = conn
            .query_row(
                "SELECT status FROM documents WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(Some(current))
    })?;

    match outcome {
        None => Ok(()),
        Some(None) => Err(TransitionError::NotFound(id.to_string())),
        Some(Some(from)) => Err(TransitionError::InvalidTransition {
            document_id: id.to_string(),
            from,
            to,
        }),
    }
}

/// Inserts a new document row.
pub fn insert(db: &Database, doc: &Document) -> Result<(), DatabaseError> {
    let extracted = doc.extracted.as_ref().map(encode_extracted).transpose()?;
    let dedupe_hash = doc.extracted.as_ref().and_then(|d| d.dedupe_hash.clone());
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (id, user_id, batch_id, filename, file_path, mime_type,
             file_size, profile, status, error_message, queue_job_id, external_job_id,
             extracted_data, dedupe_hash, processed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                doc.id,
                doc.user_id,
                doc.batch_id,
                doc.filename,
                doc.file_path.to_string_lossy(),
                doc.mime_type,
                doc.file_size as i64,
                doc.profile,
                doc.status,
                doc.error_message,
                doc.queue_job_id,
                doc.external_job_id,
                extracted,
                dedupe_hash,
                doc.processed_at,
                doc.created_at,
                doc.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a document by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE id = ?1",
                params![id],
                from_row,
            )
            .optional()?;
        Ok(doc)
    })
}

/// Like [`find_by_id`], with a missing row reported as `NotFound`.
pub fn get(db: &Database, id: &str) -> Result<Document, TransitionError> {
    find_by_id(db, id)?.ok_or_else(|| TransitionError::NotFound(id.to_string()))
}

/// `uploaded | failed → queued`, recording the queue job id and clearing
/// any previous error.
pub fn mark_queued(db: &Database, id: &str, queue_job_id: &str) -> Result<(), TransitionError> {
    let sql = format!(
        "UPDATE documents SET status = ?2, queue_job_id = ?3, error_message = NULL, updated_at = ?4
         WHERE id = ?1 AND status IN ({})",
        predecessor_list(DocumentStatus::Queued)
    );
    compare_and_set(
        db,
        id,
        DocumentStatus::Queued,
        &sql,
        params![id, DocumentStatus::Queued, queue_job_id, now_rfc3339()],
    )
}

/// `queued → processing`.
pub fn mark_processing(db: &Database, id: &str) -> Result<(), TransitionError> {
    let sql = format!(
        "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status IN ({})",
        predecessor_list(DocumentStatus::Processing)
    );
    compare_and_set(
        db,
        id,
        DocumentStatus::Processing,
        &sql,
        params![id, DocumentStatus::Processing, now_rfc3339()],
    )
}

/// Records the extraction service's job id. Never overwrites an existing one.
///
/// Returns `false` when the document already had an identifier.
pub fn set_external_job_id(
    db: &Database,
    id: &str,
    external_job_id: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET external_job_id = ?2, updated_at = ?3
             WHERE id = ?1 AND external_job_id IS NULL",
            params![id, external_job_id, now_rfc3339()],
        )?;
        Ok(changed == 1)
    })
}

/// `processing → processed`: persists the payload, sets `processed_at` and
/// clears the error in one statement. Requires an external job id.
pub fn mark_processed(db: &Database, id: &str, data: &ExtractedData) -> Result<(), TransitionError> {
    let extracted = encode_extracted(data)?;
    let now = now_rfc3339();
    let sql = format!(
        "UPDATE documents SET status = ?2, extracted_data = ?3, dedupe_hash = ?4,
         error_message = NULL, processed_at = ?5, updated_at = ?5
         WHERE id = ?1 AND external_job_id IS NOT NULL AND status IN ({})",
        predecessor_list(DocumentStatus::Processed)
    );
    compare_and_set(
        db,
        id,
        DocumentStatus::Processed,
        &sql,
        params![id, DocumentStatus::Processed, extracted, data.dedupe_hash, now],
    )
}

/// `processing → failed` with the consolidated error message.
pub fn mark_failed(db: &Database, id: &str, error_message: &str) -> Result<(), TransitionError> {
    let sql = format!(
        "UPDATE documents SET status = ?2, error_message = ?3, updated_at = ?4
         WHERE id = ?1 AND status IN ({})",
        predecessor_list(DocumentStatus::Failed)
    );
    compare_and_set(
        db,
        id,
        DocumentStatus::Failed,
        &sql,
        params![id, DocumentStatus::Failed, error_message, now_rfc3339()],
    )
}

/// Replaces the extracted payload of a `processed` or `failed` document.
/// Status is left untouched.
pub fn update_extracted(db: &Database, id: &str, data: &ExtractedData) -> Result<(), TransitionError> {
    let extracted = encode_extracted(data)?;
    let outcome = db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET extracted_data = ?2, dedupe_hash = ?3, updated_at = ?4
             WHERE id = ?1 AND status IN ('processed', 'failed')",
            params![id, extracted, data.dedupe_hash, now_rfc3339()],
        )?;
        if changed > 0 {
            return Ok(None);
        }
        let current: Option<DocumentStatus> = conn
            .query_row(
                "SELECT status FROM documents WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(Some(current))
    })?;

    match outcome {
        None => Ok(()),
        Some(None) => Err(TransitionError::NotFound(id.to_string())),
        Some(Some(status)) => Err(TransitionError::NotTerminal {
            document_id: id.to_string(),
            status,
        }),
    }
}

/// Another `processed` document carrying the same dedupe hash, if any.
pub fn find_processed_duplicate(
    db: &Database,
    dedupe_hash: &str,
    exclude_id: &str,
) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let id = conn
            .query_row(
                "SELECT id FROM documents
                 WHERE dedupe_hash = ?1 AND status = 'processed' AND id != ?2
                 ORDER BY processed_at ASC LIMIT 1",
                params![dedupe_hash, exclude_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    })
}

/// Per-status document counts for one batch.
pub fn count_by_status_for_batch(
    db: &Database,
    batch_id: &str,
) -> Result<Vec<(DocumentStatus, u64)>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM documents WHERE batch_id = ?1 GROUP BY status",
        )?;
        let rows = stmt
            .query_map(params![batch_id], |r| {
                Ok((r.get::<_, DocumentStatus>(0)?, r.get::<_, u64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All documents of a batch, oldest first.
pub fn list_by_batch(db: &Database, batch_id: &str) -> Result<Vec<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM documents WHERE batch_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt
            .query_map(params![batch_id], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Documents in `status`, newest first, up to `limit`.
pub fn list_by_status(
    db: &Database,
    status: DocumentStatus,
    limit: u64,
) -> Result<Vec<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM documents WHERE status = ?1 ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![status, limit as i64], from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_doc() -> Document {
        Document::new(
            "user-1",
            "invoice.pdf",
            PathBuf::from("/data/uploads/invoice.pdf"),
            "application/pdf",
            2048,
        )
    }

    fn processing_doc(db: &Database) -> Document {
        let doc = sample_doc();
        insert(db, &doc).unwrap();
        mark_queued(db, &doc.id, &format!("doc-{}", doc.id)).unwrap();
        mark_processing(db, &doc.id).unwrap();
        doc
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let doc = sample_doc().with_batch("batch-1");
        insert(&db, &doc).unwrap();

        let found = find_by_id(&db, &doc.id).unwrap().unwrap();
        assert_eq!(found, doc);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
        assert!(matches!(get(&db, "missing"), Err(TransitionError::NotFound(_))));
    }

    #[test]
    fn test_happy_path_transitions() {
        let db = test_db();
        let doc = processing_doc(&db);
        assert!(set_external_job_id(&db, &doc.id, "ext-1").unwrap());

        let data = ExtractedData {
            invoice_id: Some("INV-1".into()),
            dedupe_hash: Some("hash-1".into()),
            ..Default::default()
        };
        mark_processed(&db, &doc.id, &data).unwrap();

        let found = get(&db, &doc.id).unwrap();
        assert_eq!(found.status, DocumentStatus::Processed);
        assert_eq!(found.queue_job_id, Some(format!("doc-{}", doc.id)));
        assert_eq!(found.extracted, Some(data));
        assert!(found.processed_at.is_some());
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let db = test_db();
        let doc = sample_doc();
        insert(&db, &doc).unwrap();

        let err = mark_processing(&db, &doc.id).unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                from: DocumentStatus::Uploaded,
                to: DocumentStatus::Processing,
                ..
            }
        ));
        assert!(mark_failed(&db, &doc.id, "boom").is_err());
        assert_eq!(get(&db, &doc.id).unwrap().status, DocumentStatus::Uploaded);
    }

    #[test]
    fn test_processed_requires_external_id() {
        let db = test_db();
        let doc = processing_doc(&db);
        assert!(mark_processed(&db, &doc.id, &ExtractedData::default()).is_err());
        assert_eq!(get(&db, &doc.id).unwrap().status, DocumentStatus::Processing);
    }

    #[test]
    fn test_external_id_is_never_overwritten() {
        let db = test_db();
        let doc = processing_doc(&db);
        assert!(set_external_job_id(&db, &doc.id, "ext-1").unwrap());
        assert!(!set_external_job_id(&db, &doc.id, "ext-2").unwrap());
        assert_eq!(
            get(&db, &doc.id).unwrap().external_job_id.as_deref(),
            Some("ext-1")
        );
    }

    #[test]
    fn test_failed_then_resubmitted_clears_error() {
        let db = test_db();
        let doc = processing_doc(&db);
        mark_failed(&db, &doc.id, "extraction timed out").unwrap();
        let failed = get(&db, &doc.id).unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("extraction timed out"));

        mark_queued(&db, &doc.id, "doc-again").unwrap();
        let requeued = get(&db, &doc.id).unwrap();
        assert_eq!(requeued.status, DocumentStatus::Queued);
        assert!(requeued.error_message.is_none());
    }

    #[test]
    fn test_processed_cannot_be_requeued() {
        let db = test_db();
        let doc = processing_doc(&db);
        set_external_job_id(&db, &doc.id, "ext-1").unwrap();
        mark_processed(&db, &doc.id, &ExtractedData::default()).unwrap();
        assert!(mark_queued(&db, &doc.id, "doc-x").is_err());
    }

    #[test]
    fn test_update_extracted_only_on_terminal_documents() {
        let db = test_db();
        let doc = processing_doc(&db);
        let data = ExtractedData {
            vendor_name: Some("Acme".into()),
            ..Default::default()
        };
        assert!(update_extracted(&db, &doc.id, &data).is_err());

        set_external_job_id(&db, &doc.id, "ext-1").unwrap();
        mark_processed(&db, &doc.id, &ExtractedData::default()).unwrap();
        update_extracted(&db, &doc.id, &data).unwrap();
        assert_eq!(get(&db, &doc.id).unwrap().extracted, Some(data));
    }

    #[test]
    fn test_find_processed_duplicate_ignores_self_and_unprocessed() {
        let db = test_db();
        let data = ExtractedData {
            dedupe_hash: Some("same".into()),
            ..Default::default()
        };

        let first = processing_doc(&db);
        set_external_job_id(&db, &first.id, "ext-1").unwrap();
        assert!(find_processed_duplicate(&db, "same", "other").unwrap().is_none());
        mark_processed(&db, &first.id, &data).unwrap();

        assert!(find_processed_duplicate(&db, "same", &first.id).unwrap().is_none());
        assert_eq!(
            find_processed_duplicate(&db, "same", "other").unwrap(),
            Some(first.id.clone())
        );
    }

    #[test]
    fn test_count_by_status_for_batch() {
        let db = test_db();
        for _ in 0..2 {
            insert(&db, &sample_doc().with_batch("b1")).unwrap();
        }
        let queued = sample_doc().with_batch("b1");
        insert(&db, &queued).unwrap();
        mark_queued(&db, &queued.id, "doc-q").unwrap();
        insert(&db, &sample_doc().with_batch("b2")).unwrap();

        let mut counts = count_by_status_for_batch(&db, "b1").unwrap();
        counts.sort_by_key(|(s, _)| s.as_str());
        assert_eq!(
            counts,
            vec![(DocumentStatus::Queued, 1), (DocumentStatus::Uploaded, 2)]
        );
        assert_eq!(list_by_batch(&db, "b1").unwrap().len(), 3);
        assert!(count_by_status_for_batch(&db, "nope").unwrap().is_empty());
    }
}
