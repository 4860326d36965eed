//! psm-cli — 인터랙티브 TUI 모듈
//!
//! `main.rs`에서 `tui::run(client, settings).await`로 호출됩니다.
//! 대시보드(스크립트 목록 + 부하 게이지)와 콘솔 뷰를 제공합니다.

pub mod app;
pub mod render;
pub mod theme;

use std::future::Future;
use std::io::{self, stdout};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use app::*;
use crate::cli_config::CliSettings;
use crate::client::DaemonClient;

pub async fn run(client: DaemonClient, settings: CliSettings) -> anyhow::Result<()> {
    // 패닉 시 터미널 복원
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        default_hook(info);
    }));

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut app = App::new(client.clone(), settings.clone());
    let (tx, mut rx) = mpsc::unbounded_channel::<UiMsg>();

    // ── 상태 모니터 (주기 폴링) ─────────────────────────────
    {
        let client = client.clone();
        let tx = tx.clone();
        let refresh = settings.refresh_interval.max(1);
        tokio::spawn(async move {
            loop {
                let daemon = client.ping().await;
                let mut scripts = Vec::new();
                let mut total_cpu = 0.0;
                let mut total_memory = 0.0;
                if daemon {
                    if let Ok(list) = client.list_scripts().await {
                        scripts = list.iter().map(ScriptRow::from_json).collect();
                    }
                    if let Ok(usage) = client.usage().await {
                        total_cpu = usage["total_cpu_percent"].as_f64().unwrap_or(0.0);
                        total_memory = usage["total_memory_percent"].as_f64().unwrap_or(0.0);
                    }
                }
                if tx
                    .send(UiMsg::Snapshot(Snapshot { daemon, scripts, total_cpu, total_memory }))
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(refresh)).await;
            }
        });
    }

    let mut console_task: Option<JoinHandle<()>> = None;

    // ── 이벤트 루프 ─────────────────────────────────────────
    loop {
        terminal.draw(|frame| render::draw(frame, &app))?;

        while let Ok(msg) = rx.try_recv() {
            match msg {
                UiMsg::Snapshot(snapshot) => app.apply_snapshot(snapshot),
                UiMsg::ConsoleLines(lines) => app.push_console_lines(lines),
                UiMsg::ActionOk(message) => app.set_status(true, message),
                UiMsg::ActionErr(message) => app.set_status(false, message),
            }
        }

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut app, key.code, &tx, &mut console_task);
                }
            }
        }
    }

    if let Some(task) = console_task.take() {
        task.abort();
    }

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// 액션을 백그라운드로 실행하고 결과를 상태줄 메시지로 돌려보냄
fn dispatch<F>(tx: &mpsc::UnboundedSender<UiMsg>, fut: F)
where
    F: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let msg = match fut.await {
            Ok(message) => UiMsg::ActionOk(message),
            Err(e) => UiMsg::ActionErr(e.to_string()),
        };
        let _ = tx.send(msg);
    });
}

fn open_console(
    app: &mut App,
    tx: &mpsc::UnboundedSender<UiMsg>,
    console_task: &mut Option<JoinHandle<()>>,
) {
    let Some(script) = app.selected_script().cloned() else { return };

    app.console_lines.clear();
    app.console_input.clear();
    app.screen = Screen::Console {
        id: script.id.clone(),
        name: script.display_name.clone(),
    };

    let client = app.client.clone();
    let tx = tx.clone();
    let poll = app.settings.console_poll_millis.max(100);
    let task = tokio::spawn(async move {
        let mut last_id: Option<u64> = None;
        loop {
            let result = match last_id {
                None => client.console_recent(&script.id, 200).await,
                Some(n) => client.console_since(&script.id, n).await,
            };
            if let Ok(lines) = result {
                if !lines.is_empty() {
                    last_id = lines
                        .iter()
                        .filter_map(|l| l["id"].as_u64())
                        .max()
                        .or(last_id);
                    let rows: Vec<ConsoleRow> = lines.iter().map(ConsoleRow::from_json).collect();
                    if tx.send(UiMsg::ConsoleLines(rows)).is_err() {
                        break;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(poll)).await;
        }
    });
    *console_task = Some(task);
}

fn close_console(app: &mut App, console_task: &mut Option<JoinHandle<()>>) {
    if let Some(task) = console_task.take() {
        task.abort();
    }
    app.console_lines.clear();
    app.screen = Screen::Dashboard;
    app.input_mode = InputMode::Normal;
}

fn handle_key(
    app: &mut App,
    code: KeyCode,
    tx: &mpsc::UnboundedSender<UiMsg>,
    console_task: &mut Option<JoinHandle<()>>,
) {
    match app.input_mode.clone() {
        InputMode::Prompt(kind) => handle_prompt_key(app, code, &kind, tx),
        InputMode::ConfirmDelete => handle_confirm_key(app, code, tx),
        InputMode::ConsoleInput => handle_console_input_key(app, code, tx),
        InputMode::Normal => match &app.screen {
            Screen::Dashboard => handle_dashboard_key(app, code, tx, console_task),
            Screen::Console { .. } => handle_console_key(app, code, console_task),
        },
    }
}

fn handle_dashboard_key(
    app: &mut App,
    code: KeyCode,
    tx: &mpsc::UnboundedSender<UiMsg>,
    console_task: &mut Option<JoinHandle<()>>,
) {
    match code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Enter => open_console(app, tx, console_task),
        KeyCode::Char('a') => {
            app.input.clear();
            app.input_mode = InputMode::Prompt(PromptKind::AddPath);
        }
        KeyCode::Char('n') => {
            if let Some(name) = app.selected_script().map(|s| s.display_name.clone()) {
                app.input = name;
                app.input_mode = InputMode::Prompt(PromptKind::Rename);
            }
        }
        KeyCode::Char('d') => {
            if app.selected_script().is_some() {
                app.input_mode = InputMode::ConfirmDelete;
            }
        }
        KeyCode::Char('s') => {
            if let Some(script) = app.selected_script() {
                let client = app.client.clone();
                let id = script.id.clone();
                dispatch(tx, async move {
                    let result = client.start_script(&id).await?;
                    Ok(result["message"].as_str().unwrap_or("started").to_string())
                });
            }
        }
        KeyCode::Char('x') => {
            if let Some(script) = app.selected_script() {
                let client = app.client.clone();
                let id = script.id.clone();
                dispatch(tx, async move {
                    let result = client.stop_script(&id).await?;
                    Ok(result["message"].as_str().unwrap_or("stopped").to_string())
                });
            }
        }
        KeyCode::Char('p') => {
            // 실행 중이면 일시정지, 일시정지면 재개 (토글)
            if let Some(script) = app.selected_script().cloned() {
                let client = app.client.clone();
                let id = script.id.clone();
                match script.status.as_str() {
                    "running" => dispatch(tx, async move {
                        client.pause_script(&id).await?;
                        Ok("paused".to_string())
                    }),
                    "paused" => dispatch(tx, async move {
                        client.resume_script(&id).await?;
                        Ok("resumed".to_string())
                    }),
                    other => app.set_status(false, format!("Cannot pause a {} script", other)),
                }
            }
        }
        _ => {}
    }
}

fn handle_confirm_key(app: &mut App, code: KeyCode, tx: &mpsc::UnboundedSender<UiMsg>) {
    match code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            app.input_mode = InputMode::Normal;
            if let Some(script) = app.selected_script().cloned() {
                let client = app.client.clone();
                dispatch(tx, async move {
                    client.delete_script(&script.id).await?;
                    Ok(format!("Removed '{}'", script.display_name))
                });
            }
        }
        KeyCode::Char('n') | KeyCode::Esc => app.input_mode = InputMode::Normal,
        _ => {}
    }
}

fn handle_console_key(
    app: &mut App,
    code: KeyCode,
    console_task: &mut Option<JoinHandle<()>>,
) {
    match code {
        KeyCode::Esc => close_console(app, console_task),
        KeyCode::Char('q') => {
            close_console(app, console_task);
            app.should_quit = true;
        }
        KeyCode::Char('i') => app.input_mode = InputMode::ConsoleInput,
        _ => {}
    }
}

fn handle_console_input_key(app: &mut App, code: KeyCode, tx: &mpsc::UnboundedSender<UiMsg>) {
    match code {
        KeyCode::Esc => {
            app.console_input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            let input = app.console_input.clone();
            app.console_input.clear();
            app.input_mode = InputMode::Normal;
            if input.is_empty() {
                return;
            }
            let console_id = match &app.screen {
                Screen::Console { id, .. } => Some(id.clone()),
                _ => None,
            };
            if let Some(id) = console_id {
                // 보낸 입력을 즉시 에코
                app.push_console_lines(vec![ConsoleRow {
                    source: "system".into(),
                    level: "info".into(),
                    content: format!("> {}", input),
                }]);
                let client = app.client.clone();
                dispatch(tx, async move {
                    client.send_stdin(&id, &input).await?;
                    Ok(String::new())
                });
            }
        }
        KeyCode::Backspace => {
            app.console_input.pop();
        }
        KeyCode::Char(c) => app.console_input.push(c),
        _ => {}
    }
}

fn handle_prompt_key(
    app: &mut App,
    code: KeyCode,
    kind: &PromptKind,
    tx: &mpsc::UnboundedSender<UiMsg>,
) {
    match code {
        KeyCode::Esc => {
            app.input.clear();
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            let value = app.input.trim().to_string();
            app.input.clear();
            app.input_mode = InputMode::Normal;
            if value.is_empty() {
                return;
            }
            let client = app.client.clone();
            match kind {
                PromptKind::AddPath => dispatch(tx, async move {
                    let result = client.add_script(&value, None, &[]).await?;
                    let name = result["script"]["display_name"].as_str().unwrap_or("script");
                    Ok(format!("Added '{}'", name))
                }),
                PromptKind::Rename => {
                    if let Some(script) = app.selected_script() {
                        let id = script.id.clone();
                        dispatch(tx, async move {
                            client
                                .update_script(&id, serde_json::json!({ "display_name": value }))
                                .await?;
                            Ok("Renamed".to_string())
                        });
                    }
                }
            }
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Char(c) => app.input.push(c),
        _ => {}
    }
}
