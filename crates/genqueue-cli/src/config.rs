use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Layered settings read ahead of CLI flags: built-in defaults, an optional config
/// file (`genqueue.toml` or `genqueue.yaml` in the current directory or the OS
/// config dir), then `GENQUEUE_*` environment variables. CLI flags always win and
/// are applied on top by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub heartbeat: Option<u64>,
    pub lock_timeout: Option<i64>,
    pub idle_sleep: Option<f64>,
    pub settings_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn load() -> Self {
        let mut config = Self::from_candidate_files();
        config.apply_env();
        config
    }

    fn from_candidate_files() -> Self {
        for path in candidate_paths() {
            if let Some(config) = read_file(&path) {
                return config;
            }
        }
        Self::default()
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GENQUEUE_HEARTBEAT") {
            if let Ok(parsed) = v.parse() {
                self.heartbeat = Some(parsed);
            }
        }
        if let Ok(v) = std::env::var("GENQUEUE_LOCK_TIMEOUT") {
            if let Ok(parsed) = v.parse() {
                self.lock_timeout = Some(parsed);
            }
        }
        if let Ok(v) = std::env::var("GENQUEUE_IDLE_SLEEP") {
            if let Ok(parsed) = v.parse() {
                self.idle_sleep = Some(parsed);
            }
        }
        if let Ok(v) = std::env::var("GENQUEUE_SETTINGS_FILE") {
            self.settings_file = Some(PathBuf::from(v));
        }
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("genqueue.toml"), PathBuf::from("genqueue.yaml")];
    if let Some(dirs) = directories::ProjectDirs::from("com", "genqueue", "genqueue") {
        paths.push(dirs.config_dir().join("genqueue.toml"));
        paths.push(dirs.config_dir().join("genqueue.yaml"));
    }
    paths
}

fn read_file(path: &Path) -> Option<FileConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents).ok(),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&contents).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_file_parses_into_overrides() {
        let toml_text = "heartbeat = 45\nlock_timeout = 90\n";
        let parsed: FileConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(parsed.heartbeat, Some(45));
        assert_eq!(parsed.lock_timeout, Some(90));
    }

    #[test]
    fn yaml_file_parses_into_overrides() {
        let yaml_text = "idle_sleep: 2.5\nsettings_file: /tmp/settings.json\n";
        let parsed: FileConfig = serde_yaml::from_str(yaml_text).unwrap();
        assert_eq!(parsed.idle_sleep, Some(2.5));
        assert_eq!(parsed.settings_file, Some(PathBuf::from("/tmp/settings.json")));
    }

    #[test]
    fn missing_file_yields_defaults() {
        assert!(read_file(Path::new("/nonexistent/genqueue.toml")).is_none());
    }
}
