use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use genqueue_model::{Task, TaskKind, TaskStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::repository::{CandidateRef, StaleLease, SuccessResult, TaskRepository};
use crate::rowmap::{audio_from_row, fmt_dt, fmt_dt_opt, image_from_row, video_from_row};
use crate::schema::{apply_pragmas, create_schema};

type RowMapper = fn(&Row) -> Result<Task, StoreError>;

/// SQLite-backed `TaskRepository`. One `db_path` is typically shared by many
/// worker processes; this struct only guards *this process's* handle with a
/// mutex — cross-process coordination is left entirely to SQLite's own file
/// locking and `busy_timeout`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an existing database file, failing instead of creating one — used by
    /// the CLI, which treats a missing database as a hard startup error.
    pub fn open_existing(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(StoreError::MissingDatabase(path.display().to_string()));
        }
        Self::open(path)
    }

    fn mapper(kind: TaskKind) -> RowMapper {
        match kind {
            TaskKind::Image => image_from_row,
            TaskKind::Video => video_from_row,
            TaskKind::Audio => audio_from_row,
        }
    }
}

impl TaskRepository for SqliteStore {
    fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let r = task.record();
        let common = (
            r.id.as_str(),
            r.subtype.as_str(),
            r.status.as_str(),
            r.priority,
            r.depends_on.as_deref(),
            r.project_id.as_deref(),
            r.max_retries,
            r.retry_count,
            r.timeout_seconds,
            fmt_dt_opt(r.expire_at),
            fmt_dt(r.created_at),
            fmt_dt(r.updated_at),
            r.processed as i64,
        );

        match task {
            Task::Image(t) => conn.execute(
                "INSERT INTO image_task (
                    id, subtype, status, priority, depends_on, project_id,
                    max_retries, retry_count, timeout_seconds, expire_at, created_at, updated_at, processed,
                    prompt, aspect_ratio, resolution, reference_images, provider, output_dir,
                    shot_id, shot_sequence, slot
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13, ?14,?15,?16,?17,?18,?19,?20,?21,?22)",
                params![
                    common.0, common.1, common.2, common.3, common.4, common.5,
                    common.6, common.7, common.8, common.9, common.10, common.11, common.12,
                    t.prompt, t.aspect_ratio, t.resolution, t.reference_images, t.provider, t.output_dir,
                    t.shot_id, t.shot_sequence, t.slot,
                ],
            )?,
            Task::Video(t) => conn.execute(
                "INSERT INTO video_task (
                    id, subtype, status, priority, depends_on, project_id,
                    max_retries, retry_count, timeout_seconds, expire_at, created_at, updated_at, processed,
                    prompt, aspect_ratio, resolution, reference_images, duration, provider, output_dir,
                    shot_id, shot_sequence
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13, ?14,?15,?16,?17,?18,?19,?20,?21,?22)",
                params![
                    common.0, common.1, common.2, common.3, common.4, common.5,
                    common.6, common.7, common.8, common.9, common.10, common.11, common.12,
                    t.prompt, t.aspect_ratio, t.resolution, t.reference_images, t.duration, t.provider, t.output_dir,
                    t.shot_id, t.shot_sequence,
                ],
            )?,
            Task::Audio(t) => conn.execute(
                "INSERT INTO audio_task (
                    id, subtype, status, priority, depends_on, project_id,
                    max_retries, retry_count, timeout_seconds, expire_at, created_at, updated_at, processed,
                    text, voice_ref, emotion, emotion_intensity, speed, provider, output_dir,
                    result_duration_ms, shot_id, shot_sequence, dialogue_index
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13, ?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)",
                params![
                    common.0, common.1, common.2, common.3, common.4, common.5,
                    common.6, common.7, common.8, common.9, common.10, common.11, common.12,
                    t.text, t.voice_ref, t.emotion, t.emotion_intensity, t.speed, t.provider, t.output_dir,
                    t.result_duration_ms, t.shot_id, t.shot_sequence, t.dialogue_index,
                ],
            )?,
        };
        Ok(())
    }

    fn get_task(&self, kind: TaskKind, id: &str) -> Result<Option<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT * FROM {} WHERE id = ?1", kind.table_name());
        let mapper = Self::mapper(kind);
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt
            .query_row(params![id], |row| {
                Ok(mapper(row).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                }))
            })
            .optional()?;
        match result {
            Some(Ok(task)) => Ok(Some(task)),
            Some(Err(rusqlite::Error::FromSqlConversionFailure(_, _, e))) => {
                Err(StoreError::Decode(e.to_string()))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn get_status(&self, kind: TaskKind, id: &str) -> Result<Option<TaskStatus>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT status FROM {} WHERE id = ?1", kind.table_name());
        let status: Option<String> = conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;
        status
            .map(|s| {
                s.parse()
                    .map_err(|_| StoreError::Decode(format!("bad status {s:?}")))
            })
            .transpose()
    }

    fn list_tasks(
        &self,
        kind: TaskKind,
        status: Option<TaskStatus>,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mapper = Self::mapper(kind);
        let table = kind.table_name();
        let rows = if let Some(status) = status {
            let sql = format!(
                "SELECT * FROM {table} WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![status.as_str(), limit, offset], |r| Ok(mapper(r)))?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let sql = format!("SELECT * FROM {table} ORDER BY created_at DESC LIMIT ?1 OFFSET ?2");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![limit, offset], |r| Ok(mapper(r)))?
                .collect::<Result<Vec<_>, _>>()?
        };
        rows.into_iter().collect()
    }

    fn count_by_status(&self, kind: TaskKind) -> Result<BTreeMap<TaskStatus, i64>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            kind.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut out = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((status, count))
        })?;
        for row in rows {
            let (status, count) = row?;
            if let Ok(status) = status.parse::<TaskStatus>() {
                out.insert(status, count);
            }
        }
        Ok(out)
    }

    fn claim_candidates(
        &self,
        kind: TaskKind,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
        project_id: Option<&str>,
        exclude_project: bool,
    ) -> Result<Vec<CandidateRef>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let table = kind.table_name();
        let base = format!(
            "SELECT id, depends_on FROM {table}
             WHERE status = 'pending' AND expire_at > ?1
               AND (locked_by IS NULL OR locked_at < ?2)"
        );
        let rows = match (project_id, exclude_project) {
            (Some(p), false) => {
                let sql = format!("{base} AND project_id = ?3 ORDER BY priority ASC, created_at ASC");
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map(params![fmt_dt(now), fmt_dt(lock_cutoff), p], row_to_candidate)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            (Some(p), true) => {
                let sql = format!(
                    "{base} AND (project_id IS NULL OR project_id != ?3) ORDER BY priority ASC, created_at ASC"
                );
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map(params![fmt_dt(now), fmt_dt(lock_cutoff), p], row_to_candidate)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            (None, _) => {
                let sql = format!("{base} ORDER BY priority ASC, created_at ASC");
                let mut stmt = conn.prepare(&sql)?;
                stmt.query_map(params![fmt_dt(now), fmt_dt(lock_cutoff)], row_to_candidate)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    fn try_claim(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='running', locked_by=?1, locked_at=?2, started_at=?2, updated_at=?2
             WHERE id=?3 AND status='pending' AND (locked_by IS NULL OR locked_at < ?4)",
            kind.table_name()
        );
        let affected = conn.execute(
            &sql,
            params![worker_id, fmt_dt(now), id, fmt_dt(lock_cutoff)],
        )?;
        Ok(affected > 0)
    }

    fn heartbeat(
        &self,
        kind: TaskKind,
        id: &str,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET locked_at=?1 WHERE id=?2 AND locked_by=?3",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![fmt_dt(now), id, worker_id])?;
        if affected == 0 {
            warn!(%id, %worker_id, "heartbeat affected no rows, lease likely lost");
        } else {
            debug!(%id, "heartbeat recorded");
        }
        Ok(affected > 0)
    }

    fn release_success(
        &self,
        kind: TaskKind,
        id: &str,
        result: SuccessResult,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let table = kind.table_name();
        let mut set_clauses = vec![
            "status='success'".to_string(),
            "result_url=?1".to_string(),
            "result_local_path=?2".to_string(),
            "locked_by=NULL".to_string(),
            "locked_at=NULL".to_string(),
            "updated_at=?3".to_string(),
            "completed_at=?3".to_string(),
        ];
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(result.result_url.clone()),
            Box::new(result.result_local_path.clone()),
            Box::new(fmt_dt(now)),
        ];
        let mut next_idx = 4;
        for (key, value) in result.extra_fields.iter() {
            // Only kind-specific scalar result columns (e.g. result_duration_ms) are
            // ever passed here; executors never smuggle arbitrary columns through.
            set_clauses.push(format!("{key}=?{next_idx}"));
            param_values.push(json_to_sql(value));
            next_idx += 1;
        }
        let sql = format!(
            "UPDATE {table} SET {} WHERE id=?{next_idx}",
            set_clauses.join(", ")
        );
        param_values.push(Box::new(id.to_string()));
        let params_ref: Vec<&dyn rusqlite::ToSql> =
            param_values.iter().map(|b| b.as_ref()).collect();
        conn.execute(&sql, params_ref.as_slice())?;
        Ok(())
    }

    fn reopen_as_pending(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='pending', retry_count=?1, error=?2,
                locked_by=NULL, locked_at=NULL, updated_at=?3
             WHERE id=?4",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![new_retry_count, error, fmt_dt(now), id])?;
        Ok(affected > 0)
    }

    fn finalize_as_failed(
        &self,
        kind: TaskKind,
        id: &str,
        new_retry_count: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='failed', retry_count=?1, error=?2,
                locked_by=NULL, locked_at=NULL, updated_at=?3, completed_at=?3
             WHERE id=?4",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![new_retry_count, error, fmt_dt(now), id])?;
        Ok(affected > 0)
    }

    fn pause(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition_one(kind, id, "pending", "paused", now)
    }

    fn resume(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.transition_one(kind, id, "paused", "pending", now)
    }

    fn cancel(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='cancelled', updated_at=?1
             WHERE id=?2 AND status IN ('pending','paused')",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![fmt_dt(now), id])?;
        Ok(affected > 0)
    }

    fn retry_task(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='pending', retry_count=0, error=NULL,
                locked_by=NULL, locked_at=NULL, started_at=NULL, updated_at=?1, completed_at=NULL
             WHERE id=?2 AND status IN ('failed','cancelled')",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![fmt_dt(now), id])?;
        Ok(affected > 0)
    }

    fn pause_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.transition_all(kind, "pending", "paused", now)
    }

    fn resume_all_paused(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        self.transition_all(kind, "paused", "pending", now)
    }

    fn cancel_all_pending(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='cancelled', updated_at=?1 WHERE status='pending'",
            kind.table_name()
        );
        Ok(conn.execute(&sql, params![fmt_dt(now)])? as u64)
    }

    fn unprocessed(
        &self,
        kind: TaskKind,
        status: TaskStatus,
        limit: i64,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mapper = Self::mapper(kind);
        let sql = format!(
            "SELECT * FROM {} WHERE status=?1 AND processed=0 ORDER BY completed_at ASC LIMIT ?2",
            kind.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.as_str(), limit], |r| Ok(mapper(r)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn mark_processed(&self, kind: TaskKind, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET processed=1, updated_at=?1 WHERE id=?2",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![fmt_dt(now), id])?;
        Ok(affected > 0)
    }

    fn cleanup_expired(&self, kind: TaskKind, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status='cancelled', error='Task expired', updated_at=?1
             WHERE status='pending' AND expire_at IS NOT NULL AND expire_at < ?1",
            kind.table_name()
        );
        Ok(conn.execute(&sql, params![fmt_dt(now)])? as u64)
    }

    fn cleanup_completed(&self, kind: TaskKind, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "DELETE FROM {} WHERE status IN ('success','cancelled') AND completed_at IS NOT NULL AND completed_at < ?1",
            kind.table_name()
        );
        Ok(conn.execute(&sql, params![fmt_dt(before)])? as u64)
    }

    fn scan_stale_running(
        &self,
        kind: TaskKind,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<StaleLease>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT id, retry_count, max_retries, locked_by FROM {}
             WHERE status='running' AND locked_at IS NOT NULL AND locked_at < ?1",
            kind.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![fmt_dt(cutoff)], |row| {
                Ok(StaleLease {
                    kind,
                    id: row.get(0)?,
                    retry_count: row.get(1)?,
                    max_retries: row.get(2)?,
                    locked_by: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl SqliteStore {
    fn transition_one(
        &self,
        kind: TaskKind,
        id: &str,
        from: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status=?1, updated_at=?2 WHERE id=?3 AND status=?4",
            kind.table_name()
        );
        let affected = conn.execute(&sql, params![to, fmt_dt(now), id, from])?;
        Ok(affected > 0)
    }

    fn transition_all(
        &self,
        kind: TaskKind,
        from: &str,
        to: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "UPDATE {} SET status=?1, updated_at=?2 WHERE status=?3",
            kind.table_name()
        );
        Ok(conn.execute(&sql, params![to, fmt_dt(now), from])? as u64)
    }
}

fn row_to_candidate(row: &Row) -> rusqlite::Result<CandidateRef> {
    Ok(CandidateRef {
        id: row.get(0)?,
        depends_on: row.get(1)?,
    })
}

fn json_to_sql(value: &serde_json::Value) -> Box<dyn rusqlite::ToSql> {
    match value {
        serde_json::Value::Null => Box::new(Option::<i64>::None),
        serde_json::Value::Bool(b) => Box::new(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Box::new(s.clone()),
        other => Box::new(other.to_string()),
    }
}
