use rusqlite::Connection;

use crate::error::StoreError;

/// Shared lifecycle columns present on every kind table, in the order every
/// `SELECT`/`INSERT` in this crate relies on.
const COMMON_COLUMNS: &str = "
    id TEXT PRIMARY KEY,
    subtype TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 100,
    depends_on TEXT,
    project_id TEXT,
    result_url TEXT,
    result_local_path TEXT,
    error TEXT,
    max_retries INTEGER NOT NULL DEFAULT 3,
    retry_count INTEGER NOT NULL DEFAULT 0,
    timeout_seconds INTEGER NOT NULL DEFAULT 300,
    expire_at TEXT,
    locked_by TEXT,
    locked_at TEXT,
    started_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    processed INTEGER NOT NULL DEFAULT 0";

pub fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", 1)?;
    conn.pragma_update(None, "busy_timeout", 30_000)?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "cache_size", -1024 * 64)?;
    Ok(())
}

pub fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS image_task (
            {COMMON_COLUMNS},
            prompt TEXT NOT NULL,
            aspect_ratio TEXT NOT NULL,
            resolution TEXT,
            reference_images TEXT,
            provider TEXT NOT NULL,
            output_dir TEXT,
            shot_id TEXT,
            shot_sequence INTEGER,
            slot INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_image_task_poll ON image_task(status, priority, created_at);
        CREATE INDEX IF NOT EXISTS idx_image_task_expire ON image_task(expire_at);
        CREATE INDEX IF NOT EXISTS idx_image_task_shot ON image_task(shot_id);

        CREATE TABLE IF NOT EXISTS video_task (
            {COMMON_COLUMNS},
            prompt TEXT NOT NULL,
            aspect_ratio TEXT NOT NULL,
            resolution TEXT,
            reference_images TEXT,
            duration INTEGER NOT NULL DEFAULT 5,
            provider TEXT NOT NULL,
            output_dir TEXT,
            shot_id TEXT,
            shot_sequence INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_video_task_poll ON video_task(status, priority, created_at);
        CREATE INDEX IF NOT EXISTS idx_video_task_expire ON video_task(expire_at);
        CREATE INDEX IF NOT EXISTS idx_video_task_shot ON video_task(shot_id);

        CREATE TABLE IF NOT EXISTS audio_task (
            {COMMON_COLUMNS},
            text TEXT NOT NULL,
            voice_ref TEXT,
            emotion TEXT,
            emotion_intensity TEXT,
            speed REAL NOT NULL DEFAULT 1.0,
            provider TEXT NOT NULL,
            output_dir TEXT,
            result_duration_ms INTEGER,
            shot_id TEXT,
            shot_sequence INTEGER,
            dialogue_index INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_audio_task_poll ON audio_task(status, priority, created_at);
        CREATE INDEX IF NOT EXISTS idx_audio_task_expire ON audio_task(expire_at);
        CREATE INDEX IF NOT EXISTS idx_audio_task_shot ON audio_task(shot_id);
        "
    ))?;
    Ok(())
}
