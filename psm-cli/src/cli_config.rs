//! CLI 전역 설정 — %APPDATA%/psm/cli-settings.json
//!
//! 데몬 설정(settings.json)과 분리된 CLI 전용 설정 파일.
//! daemon_addr, refreshInterval 등 CLI 고유 옵션을 관리합니다.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// CLI 전역 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliSettings {
    /// 코어 데몬 주소
    #[serde(default = "default_daemon_addr")]
    pub daemon_addr: String,

    /// 대시보드 새로고침 간격 (초)
    #[serde(default = "default_refresh")]
    pub refresh_interval: u64,

    /// 콘솔 뷰 폴링 간격 (밀리초)
    #[serde(default = "default_console_poll")]
    pub console_poll_millis: u64,
}

fn default_daemon_addr() -> String { "http://127.0.0.1:57575".to_string() }
fn default_refresh() -> u64 { 1 }
fn default_console_poll() -> u64 { 500 }

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            daemon_addr: default_daemon_addr(),
            refresh_interval: default_refresh(),
            console_poll_millis: default_console_poll(),
        }
    }
}

impl CliSettings {
    /// 설정 파일 경로
    fn path() -> anyhow::Result<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")?;
            Ok(PathBuf::from(appdata).join("psm").join("cli-settings.json"))
        }
        #[cfg(not(target_os = "windows"))]
        {
            let home = std::env::var("HOME")?;
            Ok(PathBuf::from(home).join(".config").join("psm").join("cli-settings.json"))
        }
    }

    /// 로드 (없으면 기본값)
    pub fn load() -> Self {
        Self::path()
            .ok()
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// 저장
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// 키-값 문자열로 설정값 가져오기
    pub fn get_value(&self, key: &str) -> Option<String> {
        match key {
            "daemon_addr" | "addr" => Some(self.daemon_addr.clone()),
            "refresh_interval" | "refresh" => Some(self.refresh_interval.to_string()),
            "console_poll_millis" | "poll" => Some(self.console_poll_millis.to_string()),
            _ => None,
        }
    }

    /// 키-값 문자열로 설정값 변경
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "daemon_addr" | "addr" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err("Expected an http(s) URL".to_string());
                }
                self.daemon_addr = value.trim_end_matches('/').to_string();
                Ok(())
            }
            "refresh_interval" | "refresh" => {
                let n: u64 = value.parse().map_err(|_| "Expected a number (seconds)".to_string())?;
                if n == 0 || n > 60 {
                    return Err("Must be 1-60".to_string());
                }
                self.refresh_interval = n;
                Ok(())
            }
            "console_poll_millis" | "poll" => {
                let n: u64 = value.parse().map_err(|_| "Expected a number (ms)".to_string())?;
                if n < 100 || n > 10_000 {
                    return Err("Must be 100-10000".to_string());
                }
                self.console_poll_millis = n;
                Ok(())
            }
            _ => Err(format!("Unknown key '{}'", key)),
        }
    }

    /// 사용 가능한 설정 키 목록
    pub fn available_keys() -> &'static [(&'static str, &'static str)] {
        &[
            ("daemon_addr", "Core daemon address (http URL)"),
            ("refresh_interval", "Dashboard refresh interval in seconds (1-60)"),
            ("console_poll_millis", "Console polling interval in ms (100-10000)"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let s = CliSettings::default();
        assert_eq!(s.daemon_addr, "http://127.0.0.1:57575");
        assert_eq!(s.refresh_interval, 1);
        assert_eq!(s.console_poll_millis, 500);
    }

    #[test]
    fn test_set_get_value() {
        let mut s = CliSettings::default();

        assert!(s.set_value("addr", "http://127.0.0.1:6000/").is_ok());
        assert_eq!(s.get_value("daemon_addr"), Some("http://127.0.0.1:6000".into()));
        assert!(s.set_value("addr", "not-a-url").is_err());

        assert!(s.set_value("refresh_interval", "5").is_ok());
        assert_eq!(s.refresh_interval, 5);
        assert!(s.set_value("refresh_interval", "0").is_err());
        assert!(s.set_value("refresh_interval", "61").is_err());

        assert!(s.set_value("poll", "250").is_ok());
        assert_eq!(s.console_poll_millis, 250);
        assert!(s.set_value("poll", "50").is_err());

        assert!(s.set_value("nonexistent", "x").is_err());
        assert!(s.get_value("nonexistent").is_none());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut s = CliSettings::default();
        s.refresh_interval = 5;

        let json = serde_json::to_string(&s).unwrap();
        let s2: CliSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(s2.refresh_interval, 5);
    }

    #[test]
    fn test_available_keys_not_empty() {
        let keys = CliSettings::available_keys();
        assert!(keys.len() >= 3);
    }
}
