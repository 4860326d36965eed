//! Daemon settings — settings.json
//!
//! 스크립트 카탈로그(scripts.json)와 분리된 데몬 전용 설정 파일.
//! 누락된 파일이나 깨진 JSON은 기본값으로 대체합니다.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Severity keywords emitted by Python's logging module, used as the default
/// pattern for tagging relayed console lines.
pub const DEFAULT_LEVEL_PATTERN: &str = r"(?P<level>CRITICAL|ERROR|WARNING|WARN|INFO|DEBUG|TRACE)";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// IPC listen address (loopback only)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Resource monitor interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Console ring buffer capacity (lines per script)
    #[serde(default = "default_log_buffer")]
    pub log_buffer_size: usize,

    /// Interpreter used when an added script does not name one
    #[serde(default = "default_interpreter")]
    pub default_interpreter: String,

    /// Regex with a `level` capture group for console severity tagging
    #[serde(default = "default_level_pattern")]
    pub level_pattern: String,

    /// UI theme name — stored on behalf of clients, the daemon never reads it
    #[serde(default = "default_theme")]
    pub theme: String,
}

fn default_listen_addr() -> String { "127.0.0.1:57575".to_string() }
fn default_monitor_interval() -> u64 { 1 }
fn default_log_buffer() -> usize { 10_000 }
fn default_interpreter() -> String {
    #[cfg(target_os = "windows")]
    { "python.exe".to_string() }
    #[cfg(not(target_os = "windows"))]
    { "python3".to_string() }
}
fn default_level_pattern() -> String { DEFAULT_LEVEL_PATTERN.to_string() }
fn default_theme() -> String { "light".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            monitor_interval_secs: default_monitor_interval(),
            log_buffer_size: default_log_buffer(),
            default_interpreter: default_interpreter(),
            level_pattern: default_level_pattern(),
            theme: default_theme(),
        }
    }
}

impl Settings {
    /// Load from a JSON file. 파일이 없거나 파싱에 실패하면 기본값.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist as pretty JSON.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Apply a partial update coming from `PUT /api/settings`. Unknown keys
    /// are rejected so clients notice typos.
    pub fn apply_update(&mut self, update: &serde_json::Value) -> Result<(), String> {
        let obj = update.as_object().ok_or("Expected a JSON object")?;
        for (key, value) in obj {
            match key.as_str() {
                "listen_addr" => {
                    // 런타임에 바뀌지 않지만 다음 기동부터 적용
                    self.listen_addr = value
                        .as_str()
                        .ok_or("listen_addr must be a string")?
                        .to_string();
                }
                "monitor_interval_secs" => {
                    let n = value.as_u64().ok_or("monitor_interval_secs must be a number")?;
                    if n == 0 || n > 60 {
                        return Err("monitor_interval_secs must be 1-60".to_string());
                    }
                    self.monitor_interval_secs = n;
                }
                "log_buffer_size" => {
                    let n = value.as_u64().ok_or("log_buffer_size must be a number")?;
                    if n == 0 {
                        return Err("log_buffer_size must be positive".to_string());
                    }
                    self.log_buffer_size = n as usize;
                }
                "default_interpreter" => {
                    self.default_interpreter = value
                        .as_str()
                        .ok_or("default_interpreter must be a string")?
                        .to_string();
                }
                "level_pattern" => {
                    let pat = value.as_str().ok_or("level_pattern must be a string")?;
                    regex::Regex::new(pat).map_err(|e| format!("Invalid level_pattern: {}", e))?;
                    self.level_pattern = pat.to_string();
                }
                "theme" => {
                    self.theme = value.as_str().ok_or("theme must be a string")?.to_string();
                }
                other => return Err(format!("Unknown settings key '{}'", other)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.listen_addr, "127.0.0.1:57575");
        assert_eq!(s.monitor_interval_secs, 1);
        assert_eq!(s.log_buffer_size, 10_000);
        assert!(!s.default_interpreter.is_empty());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let s = Settings::load(Path::new("/nonexistent/settings.json"));
        assert_eq!(s.monitor_interval_secs, 1);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut s = Settings::default();
        s.monitor_interval_secs = 3;
        s.theme = "dark".to_string();
        s.save(&path).unwrap();

        let loaded = Settings::load(&path);
        assert_eq!(loaded.monitor_interval_secs, 3);
        assert_eq!(loaded.theme, "dark");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

        let s = Settings::load(&path);
        assert_eq!(s.theme, "dark");
        assert_eq!(s.log_buffer_size, 10_000);
    }

    #[test]
    fn test_apply_update() {
        let mut s = Settings::default();
        let update = serde_json::json!({ "monitor_interval_secs": 5, "theme": "dark" });
        assert!(s.apply_update(&update).is_ok());
        assert_eq!(s.monitor_interval_secs, 5);
        assert_eq!(s.theme, "dark");

        // 범위 밖 값 거부
        assert!(s.apply_update(&serde_json::json!({ "monitor_interval_secs": 0 })).is_err());
        assert!(s.apply_update(&serde_json::json!({ "monitor_interval_secs": 61 })).is_err());

        // 알 수 없는 키 거부
        assert!(s.apply_update(&serde_json::json!({ "no_such_key": 1 })).is_err());

        // 깨진 정규식 거부
        assert!(s.apply_update(&serde_json::json!({ "level_pattern": "(" })).is_err());
    }
}
