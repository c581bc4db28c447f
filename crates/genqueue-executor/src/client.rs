use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::ExecutorError;
use crate::settings::BackendConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
const IMAGE_REFERENCE_BUDGET_KB: u64 = 256;
const VIDEO_REFERENCE_BUDGET_KB: u64 = 768;

/// Thin wrapper over the streamed chat-completion-shaped endpoint the image/video
/// back-ends speak, plus the single-shot binary endpoint audio speaks.
pub struct GenerationClient {
    http: Client,
    config: BackendConfig,
}

impl GenerationClient {
    pub fn new(config: BackendConfig) -> Result<Self, ExecutorError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, config })
    }

    /// Streams the image endpoint, extracting up to `count` URLs, stopping as soon
    /// as that many have been found.
    pub async fn generate_image(
        &self,
        prompt: &str,
        reference_images_base64: &[String],
        count: usize,
    ) -> Result<Vec<String>, ExecutorError> {
        let content = if reference_images_base64.is_empty() {
            Value::String(prompt.to_string())
        } else {
            let mut parts = vec![json!({"type": "text", "text": prompt})];
            for b64 in reference_images_base64 {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/jpeg;base64,{b64}")},
                }));
            }
            Value::Array(parts)
        };

        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": content}],
            "stream": true,
        });

        info!(model = %self.config.model, count, "generating image(s)");
        let mut urls = Vec::new();
        let mut current_content = String::new();

        self.stream_completion(&payload, |chunk, finished| {
            current_content.push_str(chunk);
            if finished {
                if let Some(url) = extract_url_from_markdown(&current_content) {
                    urls.push(url);
                }
                current_content.clear();
            }
            urls.len() < count
        })
        .await?;

        if !current_content.is_empty() && urls.len() < count {
            if let Some(url) = extract_url_from_markdown(&current_content) {
                urls.push(url);
            }
        }

        urls.truncate(count);
        Ok(urls)
    }

    /// Streams the video endpoint to completion and extracts a single URL from the
    /// fully-accumulated content.
    pub async fn generate_video(
        &self,
        prompt: &str,
        reference_images_base64: &[String],
    ) -> Result<String, ExecutorError> {
        let content = if reference_images_base64.is_empty() {
            Value::String(prompt.to_string())
        } else {
            let mut parts = vec![json!({"type": "text", "text": prompt})];
            for b64 in reference_images_base64 {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/jpeg;base64,{b64}")},
                }));
            }
            Value::Array(parts)
        };

        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": content}],
            "stream": true,
        });

        info!(model = %self.config.model, "generating video");
        let mut current_content = String::new();
        self.stream_completion(&payload, |chunk, _finished| {
            current_content.push_str(chunk);
            true
        })
        .await?;

        extract_url_from_markdown(&current_content).ok_or_else(|| {
            ExecutorError::Backend("no video URL found in streamed response".to_string())
        })
    }

    /// Single-shot POST to the TTS endpoint; the body itself is the raw WAV payload.
    pub async fn generate_audio(
        &self,
        text: &str,
        reference_audio_base64: &str,
        speed: f64,
        emotion_vector: [f64; 8],
    ) -> Result<Vec<u8>, ExecutorError> {
        let payload = json!({
            "text": text,
            "spk_audio_base64": reference_audio_base64,
            "emo_control_method": 2,
            "emo_weight": 1.0,
            "emo_random": false,
            "emo_vec": emotion_vector,
            "speed": speed,
        });

        info!(model = %self.config.model, "generating audio");
        let response = self
            .http
            .post(&self.config.api_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Drives the SSE stream, invoking `on_chunk(delta_content, finish_reason_seen)`
    /// for every delta; the callback returns `false` to stop early (used by image
    /// generation once `count` URLs have been found).
    async fn stream_completion(
        &self,
        payload: &Value,
        mut on_chunk: impl FnMut(&str, bool) -> bool,
    ) -> Result<(), ExecutorError> {
        let request = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(payload);

        let mut source = EventSource::new(request)
            .map_err(|e| ExecutorError::Backend(format!("failed to open event stream: {e}")))?;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!("stream opened"),
                Ok(Event::Message(message)) => {
                    if message.data == "[DONE]" {
                        source.close();
                        break;
                    }
                    let Ok(data) = serde_json::from_str::<Value>(&message.data) else {
                        warn!(raw = %message.data, "failed to parse streamed JSON chunk");
                        continue;
                    };
                    let Some(choice) = data.get("choices").and_then(|c| c.get(0)) else {
                        continue;
                    };
                    let chunk = choice
                        .get("delta")
                        .and_then(|d| d.get("content"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    let finished = choice.get("finish_reason").and_then(Value::as_str).is_some();
                    if !chunk.is_empty() || finished {
                        if !on_chunk(chunk, finished) {
                            source.close();
                            break;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    source.close();
                    return Err(ExecutorError::Backend(format!("stream error: {e}")));
                }
            }
        }
        Ok(())
    }
}

/// Extracts the first URL embedded in a markdown image tag, an `<video src=...>`
/// tag, or an `<img src=...>` tag, in that priority order.
pub fn extract_url_from_markdown(text: &str) -> Option<String> {
    let markdown = Regex::new(r#"!\[.*?\]\((https?://[^\)]+)\)"#).unwrap();
    if let Some(caps) = markdown.captures(text) {
        return Some(caps[1].to_string());
    }
    let video = Regex::new(r#"<video\s+src=['"]([^'"]+)['"]"#).unwrap();
    if let Some(caps) = video.captures(text) {
        return Some(caps[1].to_string());
    }
    let img = Regex::new(r#"<img\s+src=['"]([^'"]+)['"]"#).unwrap();
    if let Some(caps) = img.captures(text) {
        return Some(caps[1].to_string());
    }
    None
}

/// Reads a local image file, re-encoding it as JPEG at decreasing quality (and
/// finally resizing) until it fits within `max_size_kb`, then base64-encodes it.
pub fn compress_image_if_needed(path: &Path, max_size_kb: u64) -> Result<String, ExecutorError> {
    let original = std::fs::read(path)?;
    if (original.len() as u64) / 1024 <= max_size_kb {
        return Ok(BASE64.encode(&original));
    }

    let img = image::load_from_memory(&original)
        .map_err(|e| ExecutorError::InvalidTask(format!("failed to decode image {}: {e}", path.display())))?
        .to_rgb8();

    for quality in [85u8, 75, 65, 55, 45, 35] {
        let mut buffer = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buffer), quality);
        encoder
            .encode_image(&img)
            .map_err(|e| ExecutorError::InvalidTask(format!("jpeg encode failed: {e}")))?;
        if (buffer.len() as u64) / 1024 <= max_size_kb {
            return Ok(BASE64.encode(&buffer));
        }
    }

    let scale = ((max_size_kb as f64) / ((original.len() as f64) / 1024.0)).sqrt();
    let new_width = ((img.width() as f64) * scale).max(1.0) as u32;
    let new_height = ((img.height() as f64) * scale).max(1.0) as u32;
    let resized = image::imageops::resize(&img, new_width, new_height, image::imageops::FilterType::Lanczos3);

    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buffer), 85);
    encoder
        .encode_image(&resized)
        .map_err(|e| ExecutorError::InvalidTask(format!("jpeg encode failed: {e}")))?;
    Ok(BASE64.encode(&buffer))
}

pub fn image_reference_budget_kb() -> u64 {
    IMAGE_REFERENCE_BUDGET_KB
}

pub fn video_reference_budget_kb() -> u64 {
    VIDEO_REFERENCE_BUDGET_KB
}

/// Downloads `url` to `output_path`, creating parent directories as needed.
pub async fn download_file(http: &Client, url: &str, output_path: &Path) -> Result<(), ExecutorError> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = http.get(url).send().await?.error_for_status()?.bytes().await?;
    std::fs::write(output_path, &bytes)?;
    Ok(())
}

/// Infers a local file extension from a URL's path, falling back to `default_ext`
/// (e.g. `.jpeg`, `.mp4`, `.wav`) when the URL has none of the known suffixes.
pub fn extension_from_url(url: &str, default_ext: &str, known: &[&str]) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(dot) = path.rfind('.') {
        let candidate = path[dot..].to_ascii_lowercase();
        if known.contains(&candidate.as_str()) {
            return candidate;
        }
    }
    default_ext.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_markdown_image_url() {
        let text = "Here you go: ![Generated Image](https://example.com/a.jpg) done";
        assert_eq!(
            extract_url_from_markdown(text),
            Some("https://example.com/a.jpg".to_string())
        );
    }

    #[test]
    fn extracts_video_tag_url() {
        let text = "<video src='https://example.com/v.mp4' controls></video>";
        assert_eq!(
            extract_url_from_markdown(text),
            Some("https://example.com/v.mp4".to_string())
        );
    }

    #[test]
    fn extracts_img_tag_as_fallback() {
        let text = r#"<img src="https://example.com/b.png">"#;
        assert_eq!(
            extract_url_from_markdown(text),
            Some("https://example.com/b.png".to_string())
        );
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        assert_eq!(extract_url_from_markdown("no urls here"), None);
    }

    #[test]
    fn extension_from_url_prefers_known_suffix() {
        assert_eq!(
            extension_from_url("https://example.com/out.png?x=1", ".jpeg", &[".png", ".jpg"]),
            ".png"
        );
        assert_eq!(extension_from_url("https://example.com/out", ".jpeg", &[".png"]), ".jpeg");
    }
}
