//! 앱 상태 · 화면 · 공유 타입 정의

use std::collections::VecDeque;

use serde_json::Value;

use crate::cli_config::CliSettings;
use crate::client::DaemonClient;

/// 대시보드에 표시되는 스크립트 한 줄
#[derive(Clone, Debug)]
pub struct ScriptRow {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub pid: Option<u32>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_bytes: u64,
}

impl ScriptRow {
    pub fn from_json(v: &Value) -> Self {
        Self {
            id: v["id"].as_str().unwrap_or("?").to_string(),
            display_name: v["display_name"].as_str().unwrap_or("?").to_string(),
            status: v["status"].as_str().unwrap_or("stopped").to_string(),
            pid: v["pid"].as_u64().map(|p| p as u32),
            cpu_percent: v["cpu_percent"].as_f64().unwrap_or(0.0),
            memory_percent: v["memory_percent"].as_f64().unwrap_or(0.0),
            memory_bytes: v["memory_bytes"].as_u64().unwrap_or(0),
        }
    }
}

/// 백그라운드 상태 스냅샷 (모니터 태스크 → App)
pub struct Snapshot {
    pub daemon: bool,
    pub scripts: Vec<ScriptRow>,
    pub total_cpu: f64,
    pub total_memory: f64,
}

/// 콘솔 뷰의 한 줄
#[derive(Clone, Debug)]
pub struct ConsoleRow {
    pub source: String,
    pub level: String,
    pub content: String,
}

impl ConsoleRow {
    pub fn from_json(v: &Value) -> Self {
        Self {
            source: v["source"].as_str().unwrap_or("stdout").to_string(),
            level: v["level"].as_str().unwrap_or("info").to_string(),
            content: v["content"].as_str().unwrap_or("").to_string(),
        }
    }
}

/// 백그라운드 태스크 → 이벤트 루프 메시지
pub enum UiMsg {
    Snapshot(Snapshot),
    ConsoleLines(Vec<ConsoleRow>),
    ActionOk(String),
    ActionErr(String),
}

/// 현재 화면
#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Dashboard,
    Console { id: String, name: String },
}

/// 입력 모드
#[derive(Clone, Debug, PartialEq)]
pub enum InputMode {
    /// 목록 내비게이션
    Normal,
    /// 한 줄 텍스트 프롬프트 (추가/이름변경)
    Prompt(PromptKind),
    /// 삭제 확인 (y/n)
    ConfirmDelete,
    /// 콘솔 stdin 입력
    ConsoleInput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PromptKind {
    AddPath,
    Rename,
}

/// 화면에 표시할 콘솔 히스토리 상한 — 데몬 쪽 링버퍼와 별개의 표시용 제한
pub const CONSOLE_VIEW_LINES: usize = 1000;

pub struct App {
    pub client: DaemonClient,
    pub settings: CliSettings,

    pub screen: Screen,
    pub input_mode: InputMode,

    // 대시보드 상태
    pub daemon_up: bool,
    pub scripts: Vec<ScriptRow>,
    pub selected: usize,
    pub total_cpu: f64,
    pub total_memory: f64,

    // 콘솔 상태
    pub console_lines: VecDeque<ConsoleRow>,
    pub console_input: String,

    // 프롬프트/상태줄
    pub input: String,
    pub status_line: Option<(bool, String)>,

    pub should_quit: bool,
}

impl App {
    pub fn new(client: DaemonClient, settings: CliSettings) -> Self {
        Self {
            client,
            settings,
            screen: Screen::Dashboard,
            input_mode: InputMode::Normal,
            daemon_up: false,
            scripts: Vec::new(),
            selected: 0,
            total_cpu: 0.0,
            total_memory: 0.0,
            console_lines: VecDeque::new(),
            console_input: String::new(),
            input: String::new(),
            status_line: None,
            should_quit: false,
        }
    }

    pub fn selected_script(&self) -> Option<&ScriptRow> {
        self.scripts.get(self.selected)
    }

    pub fn select_prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.scripts.len() {
            self.selected += 1;
        }
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot) {
        self.daemon_up = snapshot.daemon;
        self.scripts = snapshot.scripts;
        self.total_cpu = snapshot.total_cpu;
        self.total_memory = snapshot.total_memory;
        if self.selected >= self.scripts.len() {
            self.selected = self.scripts.len().saturating_sub(1);
        }
    }

    pub fn push_console_lines(&mut self, lines: Vec<ConsoleRow>) {
        for line in lines {
            if self.console_lines.len() >= CONSOLE_VIEW_LINES {
                self.console_lines.pop_front();
            }
            self.console_lines.push_back(line);
        }
    }

    pub fn set_status(&mut self, ok: bool, message: impl Into<String>) {
        self.status_line = Some((ok, message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_row_from_json() {
        let row = ScriptRow::from_json(&json!({
            "id": "abc",
            "display_name": "nightly",
            "status": "running",
            "pid": 4242,
            "cpu_percent": 12.5,
            "memory_percent": 1.5,
            "memory_bytes": 1048576,
        }));
        assert_eq!(row.id, "abc");
        assert_eq!(row.status, "running");
        assert_eq!(row.pid, Some(4242));
        assert!((row.cpu_percent - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_script_row_defaults_on_missing_fields() {
        let row = ScriptRow::from_json(&json!({}));
        assert_eq!(row.status, "stopped");
        assert_eq!(row.pid, None);
        assert_eq!(row.cpu_percent, 0.0);
    }

    #[test]
    fn test_selection_clamps_after_snapshot() {
        let client = DaemonClient::new("http://127.0.0.1:57575");
        let mut app = App::new(client, CliSettings::default());
        app.scripts = vec![
            ScriptRow::from_json(&json!({"id": "a"})),
            ScriptRow::from_json(&json!({"id": "b"})),
            ScriptRow::from_json(&json!({"id": "c"})),
        ];
        app.selected = 2;

        app.apply_snapshot(Snapshot {
            daemon: true,
            scripts: vec![ScriptRow::from_json(&json!({"id": "a"}))],
            total_cpu: 0.0,
            total_memory: 0.0,
        });
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_console_view_ring() {
        let client = DaemonClient::new("http://127.0.0.1:57575");
        let mut app = App::new(client, CliSettings::default());
        let lines: Vec<ConsoleRow> = (0..CONSOLE_VIEW_LINES + 10)
            .map(|i| ConsoleRow {
                source: "stdout".into(),
                level: "info".into(),
                content: format!("line {}", i),
            })
            .collect();
        app.push_console_lines(lines);
        assert_eq!(app.console_lines.len(), CONSOLE_VIEW_LINES);
        assert_eq!(app.console_lines.front().unwrap().content, "line 10");
    }
}
