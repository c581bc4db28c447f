use chrono::{DateTime, Utc};
use genqueue_model::{AudioTask, ImageTask, Task, TaskRecord, TaskStatus, VideoTask};
use rusqlite::Row;

use crate::error::StoreError;

pub fn parse_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    s.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Decode(format!("bad timestamp {s:?}: {e}")))
    })
    .transpose()
}

pub fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn fmt_dt_opt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_dt)
}

fn record_from_row(row: &Row) -> Result<TaskRecord, StoreError> {
    let status: String = row.get("status")?;
    let status: TaskStatus = status
        .parse()
        .map_err(|_| StoreError::Decode(format!("bad status value {status:?}")))?;

    Ok(TaskRecord {
        id: row.get("id")?,
        subtype: row.get("subtype")?,
        status,
        priority: row.get("priority")?,
        depends_on: row.get("depends_on")?,
        project_id: row.get("project_id")?,
        result_url: row.get("result_url")?,
        result_local_path: row.get("result_local_path")?,
        error: row.get("error")?,
        max_retries: row.get("max_retries")?,
        retry_count: row.get("retry_count")?,
        timeout_seconds: row.get("timeout_seconds")?,
        expire_at: parse_dt(row.get("expire_at")?)?,
        locked_by: row.get("locked_by")?,
        locked_at: parse_dt(row.get("locked_at")?)?,
        started_at: parse_dt(row.get("started_at")?)?,
        created_at: parse_dt(row.get("created_at")?)?
            .ok_or_else(|| StoreError::Decode("created_at was null".into()))?,
        updated_at: parse_dt(row.get("updated_at")?)?
            .ok_or_else(|| StoreError::Decode("updated_at was null".into()))?,
        completed_at: parse_dt(row.get("completed_at")?)?,
        processed: row.get::<_, i64>("processed")? != 0,
    })
}

pub fn image_from_row(row: &Row) -> Result<Task, StoreError> {
    Ok(Task::Image(ImageTask {
        record: record_from_row(row)?,
        prompt: row.get("prompt")?,
        aspect_ratio: row.get("aspect_ratio")?,
        resolution: row.get("resolution")?,
        reference_images: row.get("reference_images")?,
        provider: row.get("provider")?,
        output_dir: row.get("output_dir")?,
        shot_id: row.get("shot_id")?,
        shot_sequence: row.get("shot_sequence")?,
        slot: row.get("slot")?,
    }))
}

pub fn video_from_row(row: &Row) -> Result<Task, StoreError> {
    Ok(Task::Video(VideoTask {
        record: record_from_row(row)?,
        prompt: row.get("prompt")?,
        aspect_ratio: row.get("aspect_ratio")?,
        resolution: row.get("resolution")?,
        reference_images: row.get("reference_images")?,
        duration: row.get("duration")?,
        provider: row.get("provider")?,
        output_dir: row.get("output_dir")?,
        shot_id: row.get("shot_id")?,
        shot_sequence: row.get("shot_sequence")?,
    }))
}

pub fn audio_from_row(row: &Row) -> Result<Task, StoreError> {
    Ok(Task::Audio(AudioTask {
        record: record_from_row(row)?,
        text: row.get("text")?,
        voice_ref: row.get("voice_ref")?,
        emotion: row.get("emotion")?,
        emotion_intensity: row.get("emotion_intensity")?,
        speed: row.get("speed")?,
        provider: row.get("provider")?,
        output_dir: row.get("output_dir")?,
        result_duration_ms: row.get("result_duration_ms")?,
        shot_id: row.get("shot_id")?,
        shot_sequence: row.get("shot_sequence")?,
        dialogue_index: row.get("dialogue_index")?,
    }))
}
