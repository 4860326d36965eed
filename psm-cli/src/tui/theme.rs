//! 테마 · 스타일 상수 — 전체 TUI에서 일관된 색상 사용

use ratatui::style::{Color, Modifier, Style};

/// 모든 TUI 스타일을 중앙 관리하는 네임스페이스
pub struct Theme;

impl Theme {
    // ─── 상태 표시 ───
    pub fn running()  -> Style { Style::default().fg(Color::Green).add_modifier(Modifier::BOLD) }
    pub fn paused()   -> Style { Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD) }
    pub fn stopped()  -> Style { Style::default().fg(Color::DarkGray) }
    pub fn crashed()  -> Style { Style::default().fg(Color::Red).add_modifier(Modifier::BOLD) }
    pub fn error()    -> Style { Style::default().fg(Color::Red) }
    pub fn success()  -> Style { Style::default().fg(Color::Green) }

    // ─── 테두리 · 타이틀 ───
    pub fn border()        -> Style { Style::default().fg(Color::DarkGray) }
    pub fn border_active() -> Style { Style::default().fg(Color::Cyan) }
    pub fn title()         -> Style { Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD) }

    // ─── 목록 ───
    pub fn selected() -> Style { Style::default().bg(Color::DarkGray).fg(Color::White).add_modifier(Modifier::BOLD) }
    pub fn header()   -> Style { Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD) }
    pub fn dimmed()   -> Style { Style::default().fg(Color::DarkGray) }
    pub fn hint_bar() -> Style { Style::default().fg(Color::DarkGray) }

    // ─── 게이지 ───
    pub fn gauge_cpu() -> Style { Style::default().fg(Color::Cyan).bg(Color::Black) }
    pub fn gauge_mem() -> Style { Style::default().fg(Color::Magenta).bg(Color::Black) }

    // ─── 콘솔 ───
    pub fn console_stdout() -> Style { Style::default().fg(Color::White) }
    pub fn console_warn()   -> Style { Style::default().fg(Color::Yellow) }
    pub fn console_error()  -> Style { Style::default().fg(Color::Red) }
    pub fn console_debug()  -> Style { Style::default().fg(Color::DarkGray) }
    pub fn console_system() -> Style { Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC) }
    pub fn console_input()  -> Style { Style::default().fg(Color::Yellow) }

    // ─── 프롬프트 ───
    pub fn prompt()        -> Style { Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD) }
    pub fn prompt_border() -> Style { Style::default().fg(Color::Cyan) }
}
