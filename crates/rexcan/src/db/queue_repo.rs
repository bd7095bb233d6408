//! Queue repository: rows of the `queue_jobs` table.
//!
//! Scheduling columns (`run_at`, `locked_at`, `created_at`, `finished_at`)
//! are epoch milliseconds so due-time comparisons stay in SQL.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::queue::{backoff_delay, FailOutcome, JobState, QueueCounts};

impl ToSql for JobState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        JobState::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown job state '{}'", text).into()))
    }
}

/// A raw queue row.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueJobRow {
    pub id: String,
    pub document_id: String,
    pub payload: String,
    pub state: JobState,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
    pub run_at: i64,
    pub locked_by: Option<String>,
    pub locked_at: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

impl QueueJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            payload: row.get("payload")?,
            state: row.get("state")?,
            attempts_made: row.get("attempts_made")?,
            max_attempts: row.get("max_attempts")?,
            backoff_base_ms: row.get("backoff_base_ms")?,
            run_at: row.get("run_at")?,
            locked_by: row.get("locked_by")?,
            locked_at: row.get("locked_at")?,
            last_error: row.get("last_error")?,
            created_at: row.get("created_at")?,
            finished_at: row.get("finished_at")?,
        })
    }
}

/// Parameters of a new or replaced job.
pub struct NewQueueJob<'a> {
    pub id: &'a str,
    pub document_id: &'a str,
    pub payload: &'a str,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
}

/// Inserts a waiting job, or resets a finished one with the same key.
///
/// A `waiting` or `active` row is left untouched. Returns `true` when a
/// live job was created by this call.
pub fn upsert_waiting(db: &Database, job: &NewQueueJob<'_>, now: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "INSERT INTO queue_jobs (id, document_id, payload, state, attempts_made, max_attempts,
             backoff_base_ms, run_at, created_at)
             VALUES (?1, ?2, ?3, 'waiting', 0, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                state = 'waiting',
                attempts_made = 0,
                max_attempts = excluded.max_attempts,
                backoff_base_ms = excluded.backoff_base_ms,
                run_at = excluded.run_at,
                locked_by = NULL,
                locked_at = NULL,
                last_error = NULL,
                created_at = excluded.created_at,
                finished_at = NULL
             WHERE queue_jobs.state IN ('completed', 'failed')",
            params![
                job.id,
                job.document_id,
                job.payload,
                job.max_attempts,
                job.backoff_base_ms,
                now
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Finds a job by its key.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<QueueJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM queue_jobs WHERE id = ?1",
                params![id],
                QueueJobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Moves the oldest due waiting job to `active` and returns it.
pub fn claim_next(db: &Database, worker_id: &str, now: i64) -> Result<Option<QueueJobRow>, DatabaseError> {
    db.with_tx(|tx| {
        let id: Option<String> = tx
            .query_row(
                "SELECT id FROM queue_jobs WHERE state = 'waiting' AND run_at <= ?1
                 ORDER BY run_at ASC, created_at ASC LIMIT 1",
                params![now],
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE queue_jobs SET state = 'active', attempts_made = attempts_made + 1,
             locked_by = ?2, locked_at = ?3
             WHERE id = ?1 AND state = 'waiting'",
            params![id, worker_id, now],
        )?;

        let row = tx.query_row(
            "SELECT * FROM queue_jobs WHERE id = ?1",
            params![id],
            QueueJobRow::from_row,
        )?;
        Ok(Some(row))
    })
}

/// Marks an active job completed. Returns `false` if it was not active.
pub fn complete(db: &Database, id: &str, now: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE queue_jobs SET state = 'completed', finished_at = ?2,
             locked_by = NULL, locked_at = NULL
             WHERE id = ?1 AND state = 'active'",
            params![id, now],
        )?;
        Ok(changed == 1)
    })
}

/// Records a failed attempt of an active job.
///
/// The job goes back to `waiting` with a backoff delay while attempts
/// remain and the error is not permanent, otherwise to `failed`. Returns
/// `None` if the job was not active.
pub fn fail(
    db: &Database,
    id: &str,
    error: &str,
    permanent: bool,
    now: i64,
) -> Result<Option<FailOutcome>, DatabaseError> {
    db.with_tx(|tx| {
        let attempt: Option<(u32, u32, i64)> = tx
            .query_row(
                "SELECT attempts_made, max_attempts, backoff_base_ms FROM queue_jobs
                 WHERE id = ?1 AND state = 'active'",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((attempts_made, max_attempts, backoff_base_ms)) = attempt else {
            return Ok(None);
        };

        if permanent || attempts_made >= max_attempts {
            tx.execute(
                "UPDATE queue_jobs SET state = 'failed', last_error = ?2, finished_at = ?3,
                 locked_by = NULL, locked_at = NULL
                 WHERE id = ?1",
                params![id, error, now],
            )?;
            return Ok(Some(FailOutcome::Exhausted {
                attempts: attempts_made,
            }));
        }

        let delay = backoff_delay(
            std::time::Duration::from_millis(backoff_base_ms.max(0) as u64),
            attempts_made,
        );
        tx.execute(
            "UPDATE queue_jobs SET state = 'waiting', last_error = ?2, run_at = ?3,
             locked_by = NULL, locked_at = NULL
             WHERE id = ?1",
            params![id, error, now + delay.as_millis() as i64],
        )?;
        Ok(Some(FailOutcome::Retrying {
            attempt: attempts_made,
            delay,
        }))
    })
}

/// Returns active jobs locked before `cutoff` to the queue.
///
/// Jobs that already used their last attempt are failed instead; their
/// `(job id, document id)` pairs are returned.
pub fn reclaim_stalled(
    db: &Database,
    cutoff: i64,
    now: i64,
) -> Result<(usize, Vec<(String, String)>), DatabaseError> {
    db.with_tx(|tx| {
        let exhausted = {
            let mut stmt = tx.prepare(
                "SELECT id, document_id FROM queue_jobs
                 WHERE state = 'active' AND locked_at < ?1 AND attempts_made >= max_attempts",
            )?;
            let rows = stmt
                .query_map(params![cutoff], |r| Ok((r.get(0)?, r.get(1)?)))?
                .collect::<Result<Vec<(String, String)>, _>>()?;
            rows
        };

        tx.execute(
            "UPDATE queue_jobs SET state = 'failed', finished_at = ?2,
             last_error = 'job stalled on its final attempt', locked_by = NULL, locked_at = NULL
             WHERE state = 'active' AND locked_at < ?1 AND attempts_made >= max_attempts",
            params![cutoff, now],
        )?;
        let requeued = tx.execute(
            "UPDATE queue_jobs SET state = 'waiting', run_at = ?2, locked_by = NULL, locked_at = NULL
             WHERE state = 'active' AND locked_at < ?1",
            params![cutoff, now],
        )?;
        Ok((requeued, exhausted))
    })
}

/// Deletes finished jobs past their retention. Returns the number removed.
pub fn purge_finished(
    db: &Database,
    completed_before: i64,
    completed_keep: u64,
    failed_before: i64,
) -> Result<usize, DatabaseError> {
    db.with_tx(|tx| {
        let mut removed = tx.execute(
            "DELETE FROM queue_jobs WHERE state = 'completed' AND finished_at < ?1",
            params![completed_before],
        )?;
        removed += tx.execute(
            "DELETE FROM queue_jobs WHERE state = 'completed' AND id NOT IN (
                SELECT id FROM queue_jobs WHERE state = 'completed'
                ORDER BY finished_at DESC LIMIT ?1
             )",
            params![completed_keep as i64],
        )?;
        removed += tx.execute(
            "DELETE FROM queue_jobs WHERE state = 'failed' AND finished_at < ?1",
            params![failed_before],
        )?;
        Ok(removed)
    })
}

/// Job counts by state. Waiting jobs due in the future count as delayed.
pub fn counts(db: &Database, now: i64) -> Result<QueueCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT state, run_at > ?1 AS delayed, COUNT(*) FROM queue_jobs GROUP BY state, delayed",
        )?;
        let mut counts = QueueCounts::default();
        let rows = stmt.query_map(params![now], |r| {
            Ok((
                r.get::<_, JobState>(0)?,
                r.get::<_, bool>(1)?,
                r.get::<_, u64>(2)?,
            ))
        })?;
        for row in rows {
            let (state, delayed, n) = row?;
            match state {
                JobState::Waiting if delayed => counts.delayed += n,
                JobState::Waiting => counts.waiting += n,
                JobState::Active => counts.active += n,
                JobState::Completed => counts.completed += n,
                JobState::Failed => counts.failed += n,
            }
        }
        Ok(counts)
    })
}
