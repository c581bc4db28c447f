use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use genqueue_model::{Task, TaskKind};
use tokio::runtime::Runtime;

use crate::client::GenerationClient;
use crate::emotion::build_emotion_vector;
use crate::error::ExecutorError;
use crate::kind_executor::{ExecutionOutcome, KindExecutor};
use crate::settings::{resolve_backend, BackendConfig};

/// 16kHz mono 16-bit PCM assumption used for the duration fallback estimate when a
/// real WAV header can't be parsed.
const FALLBACK_BYTES_PER_MS: f64 = 32.0;

pub struct AudioExecutor {
    fallback: BackendConfig,
    settings_file: Option<PathBuf>,
    runtime: Runtime,
}

impl AudioExecutor {
    pub fn new(fallback: BackendConfig, settings_file: Option<PathBuf>) -> Result<Self, ExecutorError> {
        let runtime = Runtime::new()?;
        Ok(Self {
            fallback,
            settings_file,
            runtime,
        })
    }
}

impl KindExecutor for AudioExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::Audio
    }

    fn execute(&self, task: &Task) -> Result<ExecutionOutcome, ExecutorError> {
        let Task::Audio(audio) = task else {
            return Err(ExecutorError::InvalidTask("expected an audio task".to_string()));
        };

        let Some(voice_ref) = &audio.voice_ref else {
            return Err(ExecutorError::InvalidTask(
                "audio generation requires a voice reference file".to_string(),
            ));
        };
        let voice_path = Path::new(voice_ref);
        if !voice_path.exists() {
            return Err(ExecutorError::InvalidTask(format!(
                "voice reference file not found: {voice_ref}"
            )));
        }
        let reference_audio_base64 = BASE64.encode(std::fs::read(voice_path)?);

        let config = resolve_backend(self.settings_file.as_deref(), TaskKind::Audio, &self.fallback);
        let client = GenerationClient::new(config)?;
        let emotion_vector = build_emotion_vector(audio.emotion.as_deref(), audio.emotion_intensity.as_deref());

        let audio_bytes = self.runtime.block_on(client.generate_audio(
            &audio.text,
            &reference_audio_base64,
            audio.speed,
            emotion_vector,
        ))?;

        if audio_bytes.is_empty() {
            return Err(ExecutorError::Backend("no audio data returned from API".to_string()));
        }

        let local_path = match &audio.output_dir {
            Some(output_dir) => {
                std::fs::create_dir_all(output_dir)?;
                Path::new(output_dir).join(format!("{}.wav", audio.record.id))
            }
            None => std::env::temp_dir().join(format!("{}.wav", audio.record.id)),
        };
        std::fs::write(&local_path, &audio_bytes)?;

        let mut extra_fields = serde_json::Map::new();
        extra_fields.insert(
            "result_duration_ms".to_string(),
            serde_json::json!(estimate_duration_ms(&audio_bytes)),
        );

        Ok(ExecutionOutcome {
            result_url: None,
            result_local_path: Some(local_path.display().to_string()),
            extra_fields,
        })
    }
}

/// Estimates audio duration by decoding the WAV `fmt `/`data` chunk headers; falls
/// back to a 16kHz/16-bit/mono PCM byte-count estimate when the header can't be
/// parsed (e.g. a non-WAV payload).
fn estimate_duration_ms(audio_bytes: &[u8]) -> i64 {
    decode_wav_duration_ms(audio_bytes).unwrap_or_else(|| (audio_bytes.len() as f64 / FALLBACK_BYTES_PER_MS) as i64)
}

/// Walks RIFF/WAVE chunks looking for `fmt ` (channels, sample rate, bits per
/// sample) and `data` (payload length), then derives duration from them. Returns
/// `None` if the buffer isn't a well-formed WAV file.
fn decode_wav_duration_ms(bytes: &[u8]) -> Option<i64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut pos = 12;
    let mut sample_rate: Option<u32> = None;
    let mut channels: Option<u16> = None;
    let mut bits_per_sample: Option<u16> = None;
    let mut data_len: Option<u32> = None;

    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let chunk_start = pos + 8;

        if chunk_id == b"fmt " {
            if chunk_start + 16 > bytes.len() {
                return None;
            }
            channels = Some(u16::from_le_bytes(bytes[chunk_start + 2..chunk_start + 4].try_into().ok()?));
            sample_rate = Some(u32::from_le_bytes(bytes[chunk_start + 4..chunk_start + 8].try_into().ok()?));
            bits_per_sample = Some(u16::from_le_bytes(
                bytes[chunk_start + 14..chunk_start + 16].try_into().ok()?,
            ));
        } else if chunk_id == b"data" {
            data_len = Some(chunk_size.min(bytes.len().saturating_sub(chunk_start)) as u32);
        }

        if sample_rate.is_some() && channels.is_some() && bits_per_sample.is_some() && data_len.is_some() {
            break;
        }

        // Chunks are padded to an even number of bytes.
        pos = chunk_start + chunk_size + (chunk_size % 2);
    }

    let sample_rate = sample_rate?;
    let channels = channels?;
    let bits_per_sample = bits_per_sample?;
    let data_len = data_len?;
    if sample_rate == 0 || channels == 0 || bits_per_sample == 0 {
        return None;
    }

    let bytes_per_second = sample_rate as f64 * channels as f64 * (bits_per_sample as f64 / 8.0);
    Some(((data_len as f64 / bytes_per_second) * 1000.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use genqueue_model::{AudioTask, TaskRecord};

    fn executor() -> AudioExecutor {
        let config = BackendConfig {
            api_url: "https://example.com".to_string(),
            api_key: "k".to_string(),
            model: "m".to_string(),
        };
        AudioExecutor::new(config, None).unwrap()
    }

    fn audio_task(voice_ref: Option<&str>) -> Task {
        let record = TaskRecord::new("aud-1".to_string(), "text2speech".to_string(), 10, 3, 300);
        Task::Audio(AudioTask {
            record,
            text: "hello there".to_string(),
            voice_ref: voice_ref.map(str::to_string),
            emotion: Some("happy".to_string()),
            emotion_intensity: Some("strong".to_string()),
            speed: 1.0,
            provider: "test".to_string(),
            output_dir: None,
            result_duration_ms: None,
            shot_id: None,
            shot_sequence: None,
            dialogue_index: None,
        })
    }

    #[test]
    fn missing_voice_ref_is_rejected() {
        let executor = executor();
        let task = audio_task(None);
        let err = executor.execute(&task).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTask(_)));
    }

    #[test]
    fn nonexistent_voice_file_is_rejected() {
        let executor = executor();
        let task = audio_task(Some("/nonexistent/voice.wav"));
        let err = executor.execute(&task).unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidTask(_)));
    }

    #[test]
    fn non_wav_payload_falls_back_to_byte_length_estimate() {
        assert_eq!(estimate_duration_ms(&vec![0u8; 320]), 10);
    }

    fn minimal_wav(sample_rate: u32, channels: u16, bits_per_sample: u16, data_bytes: usize) -> Vec<u8> {
        let data = vec![0u8; data_bytes];
        let block_align = channels * (bits_per_sample / 8);
        let byte_rate = sample_rate * block_align as u32;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&channels.to_le_bytes());
        wav.extend_from_slice(&sample_rate.to_le_bytes());
        wav.extend_from_slice(&byte_rate.to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&bits_per_sample.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(data.len() as u32).to_le_bytes());
        wav.extend_from_slice(&data);
        wav
    }

    #[test]
    fn decodes_duration_from_a_well_formed_wav_header() {
        // 16kHz/16-bit/mono, 32000 bytes of payload => 1000ms.
        let wav = minimal_wav(16_000, 1, 16, 32_000);
        assert_eq!(estimate_duration_ms(&wav), 1000);
    }

    #[test]
    fn decodes_duration_for_non_default_sample_rate_and_channels() {
        // 44.1kHz/16-bit/stereo: byte_rate = 44100 * 4 = 176400 bytes/sec.
        let wav = minimal_wav(44_100, 2, 16, 176_400);
        assert_eq!(estimate_duration_ms(&wav), 1000);
    }

    #[test]
    fn truncated_wav_header_falls_back_to_byte_length_estimate() {
        let mut wav = minimal_wav(16_000, 1, 16, 32_000);
        wav.truncate(20);
        assert_eq!(estimate_duration_ms(&wav), (wav.len() as f64 / FALLBACK_BYTES_PER_MS) as i64);
    }
}
