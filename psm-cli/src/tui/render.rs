//! 화면 렌더링 — 대시보드 · 콘솔 · 프롬프트 팝업

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Row, Table, Wrap};

use super::app::{App, InputMode, PromptKind, Screen};
use super::theme::Theme;

pub fn draw(frame: &mut Frame, app: &App) {
    match &app.screen {
        Screen::Dashboard => draw_dashboard(frame, app),
        Screen::Console { name, .. } => draw_console(frame, app, name),
    }

    if let InputMode::Prompt(kind) = &app.input_mode {
        draw_prompt(frame, app, kind);
    }
    if app.input_mode == InputMode::ConfirmDelete {
        draw_confirm(frame, app);
    }
}

fn status_style(status: &str) -> Style {
    match status {
        "running" | "starting" => Theme::running(),
        "paused" => Theme::paused(),
        "crashed" => Theme::crashed(),
        _ => Theme::stopped(),
    }
}

fn format_memory(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} KB", bytes / 1024)
    }
}

// ─── 대시보드 ────────────────────────────────────────────────

fn draw_dashboard(frame: &mut Frame, app: &App) {
    let chunks = Layout::vertical([
        Constraint::Length(4), // 전체 부하
        Constraint::Min(5),    // 스크립트 테이블
        Constraint::Length(1), // 상태줄
        Constraint::Length(1), // 힌트
    ])
    .split(frame.area());

    draw_total_load(frame, app, chunks[0]);
    draw_script_table(frame, app, chunks[1]);
    draw_status_line(frame, app, chunks[2]);

    let hint = " ↑↓ select │ enter console │ s start │ x stop │ p pause/resume │ a add │ n rename │ d delete │ q quit";
    frame.render_widget(Paragraph::new(hint).style(Theme::hint_bar()), chunks[3]);
}

/// 상단의 합산 부하 패널 — 실행 중인 모든 스크립트의 합
fn draw_total_load(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.daemon_up {
        " PSM — total load (all scripts) "
    } else {
        " PSM — daemon unreachable "
    };
    let block = Block::default()
        .title(Span::styled(title, Theme::title()))
        .borders(Borders::ALL)
        .border_style(if app.daemon_up { Theme::border() } else { Theme::error() });
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::vertical([Constraint::Length(1), Constraint::Length(1)]).split(inner);

    let cpu = app.total_cpu.clamp(0.0, 100.0);
    frame.render_widget(
        Gauge::default()
            .gauge_style(Theme::gauge_cpu())
            .label(format!("CPU {:.1}%", cpu))
            .ratio(cpu / 100.0),
        rows[0],
    );
    let mem = app.total_memory.clamp(0.0, 100.0);
    frame.render_widget(
        Gauge::default()
            .gauge_style(Theme::gauge_mem())
            .label(format!("MEM {:.1}%", mem))
            .ratio(mem / 100.0),
        rows[1],
    );
}

fn draw_script_table(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(Span::styled(" scripts ", Theme::title()))
        .borders(Borders::ALL)
        .border_style(Theme::border_active());

    if app.scripts.is_empty() {
        let empty = Paragraph::new("No scripts yet — press 'a' to add one")
            .style(Theme::dimmed())
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let header = Row::new(vec!["NAME", "STATUS", "PID", "CPU", "MEM"]).style(Theme::header());

    let rows: Vec<Row> = app
        .scripts
        .iter()
        .enumerate()
        .map(|(i, script)| {
            let pid = script
                .pid
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let row = Row::new(vec![
                Line::from(script.display_name.clone()),
                Line::from(Span::styled(script.status.clone(), status_style(&script.status))),
                Line::from(pid),
                Line::from(format!("{:5.1}%", script.cpu_percent)),
                Line::from(format!(
                    "{:4.1}% ({})",
                    script.memory_percent,
                    format_memory(script.memory_bytes)
                )),
            ]);
            if i == app.selected {
                row.style(Theme::selected())
            } else {
                row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(7),
            Constraint::Length(20),
        ],
    )
    .header(header)
    .block(block);

    frame.render_widget(table, area);
}

fn draw_status_line(frame: &mut Frame, app: &App, area: Rect) {
    if let Some((ok, message)) = &app.status_line {
        let style = if *ok { Theme::success() } else { Theme::error() };
        frame.render_widget(Paragraph::new(message.as_str()).style(style), area);
    }
}

// ─── 콘솔 ────────────────────────────────────────────────────

fn draw_console(frame: &mut Frame, app: &App, name: &str) {
    let chunks = Layout::vertical([
        Constraint::Min(5),    // 출력
        Constraint::Length(3), // 입력
        Constraint::Length(1), // 힌트
    ])
    .split(frame.area());

    let block = Block::default()
        .title(Span::styled(format!(" console — {} ", name), Theme::title()))
        .borders(Borders::ALL)
        .border_style(Theme::border_active());
    let inner_height = block.inner(chunks[0]).height as usize;

    // 꼬리 표시 — 최신 라인이 항상 보이도록
    let lines: Vec<Line> = app
        .console_lines
        .iter()
        .rev()
        .take(inner_height)
        .rev()
        .map(|row| {
            let style = match (row.source.as_str(), row.level.as_str()) {
                ("system", _) => Theme::console_system(),
                (_, "error") => Theme::console_error(),
                (_, "warn") => Theme::console_warn(),
                (_, "debug") => Theme::console_debug(),
                _ => Theme::console_stdout(),
            };
            Line::from(Span::styled(row.content.clone(), style))
        })
        .collect();

    frame.render_widget(
        Paragraph::new(lines).block(block).wrap(Wrap { trim: false }),
        chunks[0],
    );

    let input_active = app.input_mode == InputMode::ConsoleInput;
    let input_block = Block::default()
        .title(" stdin ")
        .borders(Borders::ALL)
        .border_style(if input_active { Theme::border_active() } else { Theme::border() });
    let input_text = if input_active {
        format!("> {}█", app.console_input)
    } else {
        format!("> {}", app.console_input)
    };
    frame.render_widget(
        Paragraph::new(input_text)
            .style(Theme::console_input())
            .block(input_block),
        chunks[1],
    );

    let hint = if input_active {
        " enter send │ esc cancel"
    } else {
        " i input │ esc back │ q quit"
    };
    frame.render_widget(Paragraph::new(hint).style(Theme::hint_bar()), chunks[2]);
}

// ─── 팝업 ────────────────────────────────────────────────────

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn draw_prompt(frame: &mut Frame, app: &App, kind: &PromptKind) {
    let title = match kind {
        PromptKind::AddPath => " add script — path ",
        PromptKind::Rename => " rename script ",
    };
    let area = centered_rect(60, 3, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(Span::styled(title, Theme::prompt()))
        .borders(Borders::ALL)
        .border_style(Theme::prompt_border());
    frame.render_widget(
        Paragraph::new(format!("{}█", app.input)).block(block),
        area,
    );
}

fn draw_confirm(frame: &mut Frame, app: &App) {
    let name = app
        .selected_script()
        .map(|s| s.display_name.clone())
        .unwrap_or_default();
    let area = centered_rect(50, 3, frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .title(Span::styled(" delete script ", Theme::prompt()))
        .borders(Borders::ALL)
        .border_style(Theme::error());
    frame.render_widget(
        Paragraph::new(format!("Remove '{}' from catalog? (y/n)", name)).block(block),
        area,
    );
}
