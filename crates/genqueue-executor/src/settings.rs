use std::path::Path;

use serde::{Deserialize, Serialize};

use genqueue_model::TaskKind;

/// Resolved back-end endpoint for a single task kind: where to send the request and
/// which credentials/model name to use.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_mode: ApiMode,
    #[serde(default)]
    pub hosted_service: Option<HostedService>,
    #[serde(default)]
    pub custom_api: Option<CustomApi>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    Hosted,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedService {
    pub base_url: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomApi {
    pub tti: Option<CustomApiEntry>,
    pub ttv: Option<CustomApiEntry>,
    pub tts: Option<CustomApiEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomApiEntry {
    pub api_url: String,
    pub api_key: String,
    pub model: Option<String>,
}

impl Settings {
    fn custom_entry(&self, kind: TaskKind) -> Option<&CustomApiEntry> {
        let custom = self.custom_api.as_ref()?;
        match kind {
            TaskKind::Image => custom.tti.as_ref(),
            TaskKind::Video => custom.ttv.as_ref(),
            TaskKind::Audio => custom.tts.as_ref(),
        }
    }

    /// Resolves the endpoint to use for `kind`, preferring the hosted service when
    /// `apiMode == hosted`, falling back to the per-kind `customApi` block. Returns
    /// `None` when the relevant block is present but missing its credential/URL, so
    /// the caller falls back to its constructor-supplied config instead of issuing a
    /// request with empty auth.
    pub fn resolve(&self, kind: TaskKind) -> Option<BackendConfig> {
        match self.api_mode {
            ApiMode::Hosted => {
                let hosted = self.hosted_service.as_ref()?;
                if hosted.token.is_empty() {
                    return None;
                }
                Some(BackendConfig {
                    api_url: hosted.base_url.clone(),
                    api_key: hosted.token.clone(),
                    model: format!("{}-{}-v1", "hosted", kind.as_str()),
                })
            }
            ApiMode::Custom => {
                let entry = self.custom_entry(kind)?;
                if entry.api_url.is_empty() {
                    return None;
                }
                Some(BackendConfig {
                    api_url: entry.api_url.clone(),
                    api_key: entry.api_key.clone(),
                    model: entry
                        .model
                        .clone()
                        .unwrap_or_else(|| format!("{}-{}-v1", "custom", kind.as_str())),
                })
            }
        }
    }
}

/// Reads and parses the settings file, returning `None` on any I/O or parse error so
/// the caller can fall back to its constructor-time defaults rather than crash a
/// running worker over a transient edit to the file.
pub fn load_settings(path: &Path) -> Option<Settings> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

/// Resolves the back-end config for `kind`, trying the settings file first (reloaded
/// fresh on every call) and falling back to the fixed values the executor was
/// constructed with if the file is absent, malformed, or missing that kind's block.
pub fn resolve_backend(
    settings_path: Option<&Path>,
    kind: TaskKind,
    fallback: &BackendConfig,
) -> BackendConfig {
    settings_path
        .and_then(load_settings)
        .and_then(|settings| settings.resolve(kind))
        .unwrap_or_else(|| fallback.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_mode_ignores_custom_api_block() {
        let settings = Settings {
            api_mode: ApiMode::Hosted,
            hosted_service: Some(HostedService {
                base_url: "https://hosted.example/v1".to_string(),
                token: "tok".to_string(),
            }),
            custom_api: None,
        };
        let resolved = settings.resolve(TaskKind::Image).unwrap();
        assert_eq!(resolved.api_url, "https://hosted.example/v1");
        assert_eq!(resolved.model, "hosted-image-v1");
    }

    #[test]
    fn custom_mode_picks_the_right_kind_block() {
        let settings = Settings {
            api_mode: ApiMode::Custom,
            hosted_service: None,
            custom_api: Some(CustomApi {
                tti: Some(CustomApiEntry {
                    api_url: "https://tti.example".to_string(),
                    api_key: "k1".to_string(),
                    model: Some("my-image-model".to_string()),
                }),
                ttv: None,
                tts: None,
            }),
        };
        let resolved = settings.resolve(TaskKind::Image).unwrap();
        assert_eq!(resolved.model, "my-image-model");
        assert!(settings.resolve(TaskKind::Video).is_none());
    }

    #[test]
    fn missing_file_falls_back_to_constructor_defaults() {
        let fallback = BackendConfig {
            api_url: "https://fallback.example".to_string(),
            api_key: "fallback-key".to_string(),
            model: "fallback-model".to_string(),
        };
        let resolved = resolve_backend(Some(Path::new("/nonexistent/path.json")), TaskKind::Audio, &fallback);
        assert_eq!(resolved.api_url, fallback.api_url);
    }

    #[test]
    fn hosted_mode_with_empty_token_falls_back() {
        let settings = Settings {
            api_mode: ApiMode::Hosted,
            hosted_service: Some(HostedService {
                base_url: "https://hosted.example/v1".to_string(),
                token: String::new(),
            }),
            custom_api: None,
        };
        assert!(settings.resolve(TaskKind::Image).is_none());
    }

    #[test]
    fn custom_mode_with_empty_api_url_falls_back() {
        let settings = Settings {
            api_mode: ApiMode::Custom,
            hosted_service: None,
            custom_api: Some(CustomApi {
                tti: Some(CustomApiEntry {
                    api_url: String::new(),
                    api_key: "k1".to_string(),
                    model: Some("my-image-model".to_string()),
                }),
                ttv: None,
                tts: None,
            }),
        };
        assert!(settings.resolve(TaskKind::Image).is_none());
    }
}
