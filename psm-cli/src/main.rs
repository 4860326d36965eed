mod cli_config;
mod client;
mod tui;

use cli_config::CliSettings;
use client::DaemonClient;
use serde_json::Value;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = CliSettings::load();
    let client = DaemonClient::new(&settings.daemon_addr);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        // 인자 없이 실행하면 TUI
        return tui::run(client, settings).await;
    }

    match args[0].as_str() {
        "list" | "ls" => cmd_list(&client).await,
        "add" => {
            let path = args.get(1).ok_or_else(|| anyhow::anyhow!("Usage: psm-cli add <path> [interpreter]"))?;
            let interpreter = args.get(2).map(|s| s.as_str());
            let result = client.add_script(path, interpreter, &[]).await?;
            println!("Added: {}", result["script"]["display_name"].as_str().unwrap_or("?"));
            println!("    id: {}", result["script"]["id"].as_str().unwrap_or("?"));
            Ok(())
        }
        "start" | "stop" | "pause" | "resume" | "rm" => {
            let target = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: psm-cli {} <id|name>", args[0]))?;
            let id = resolve_script(&client, target).await?;
            let result = match args[0].as_str() {
                "start" => client.start_script(&id).await?,
                "stop" => client.stop_script(&id).await?,
                "pause" => client.pause_script(&id).await?,
                "resume" => client.resume_script(&id).await?,
                _ => client.delete_script(&id).await?,
            };
            println!("{}", result["message"].as_str().unwrap_or("ok"));
            Ok(())
        }
        "set" => {
            // 스크립트 설정 변경: display_name / interpreter / autostart
            let (target, key, value) = match (args.get(1), args.get(2), args.get(3)) {
                (Some(t), Some(k), Some(v)) => (t, k.as_str(), v.as_str()),
                _ => anyhow::bail!("Usage: psm-cli set <id|name> <display_name|interpreter|autostart> <value>"),
            };
            let id = resolve_script(&client, target).await?;
            let patch = match key {
                "display_name" | "interpreter" => serde_json::json!({ key: value }),
                "autostart" => {
                    let flag: bool = value
                        .parse()
                        .map_err(|_| anyhow::anyhow!("autostart expects true/false"))?;
                    serde_json::json!({ "autostart": flag })
                }
                other => anyhow::bail!("Unknown script field '{}'", other),
            };
            client.update_script(&id, patch).await?;
            println!("{} = {}", key, value);
            Ok(())
        }
        "console" => {
            let target = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Usage: psm-cli console <id|name> [count]"))?;
            let count = args.get(2).and_then(|c| c.parse().ok()).unwrap_or(50);
            let id = resolve_script(&client, target).await?;
            for line in client.console_recent(&id, count).await? {
                let source = line["source"].as_str().unwrap_or("stdout");
                let content = line["content"].as_str().unwrap_or("");
                match source {
                    "stderr" => println!("[stderr] {}", content),
                    "system" => println!("[system] {}", content),
                    _ => println!("{}", content),
                }
            }
            Ok(())
        }
        "usage" => {
            let usage = client.usage().await?;
            println!(
                "CPU {:.1}%  MEM {:.1}%  ({} running)",
                usage["total_cpu_percent"].as_f64().unwrap_or(0.0),
                usage["total_memory_percent"].as_f64().unwrap_or(0.0),
                usage["running_count"].as_u64().unwrap_or(0)
            );
            Ok(())
        }
        "settings" => {
            // 데몬 설정 조회/변경
            match (args.get(1), args.get(2)) {
                (None, _) => {
                    let settings = client.get_settings().await?;
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                    Ok(())
                }
                (Some(key), Some(value)) => {
                    let parsed: Value = value
                        .parse::<u64>()
                        .map(Value::from)
                        .unwrap_or_else(|_| Value::from(value.as_str()));
                    let mut update = serde_json::Map::new();
                    update.insert(key.to_string(), parsed);
                    client.put_settings(Value::Object(update)).await?;
                    println!("{} = {}", key, value);
                    Ok(())
                }
                _ => anyhow::bail!("Usage: psm-cli settings [key value]"),
            }
        }
        "config" => cmd_config(&args[1..]),
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            eprintln!("Unknown command '{}'", other);
            print_help();
            std::process::exit(2);
        }
    }
}

async fn cmd_list(client: &DaemonClient) -> anyhow::Result<()> {
    let scripts = client.list_scripts().await?;
    if scripts.is_empty() {
        println!("No scripts in catalog");
        return Ok(());
    }
    println!(
        "{:<36}  {:<20}  {:<8}  {:>8}  {:>6}  {:>6}",
        "ID", "NAME", "STATUS", "PID", "CPU%", "MEM%"
    );
    for s in scripts {
        println!(
            "{:<36}  {:<20}  {:<8}  {:>8}  {:>6.1}  {:>6.1}",
            s["id"].as_str().unwrap_or("?"),
            s["display_name"].as_str().unwrap_or("?"),
            s["status"].as_str().unwrap_or("?"),
            s["pid"].as_u64().map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            s["cpu_percent"].as_f64().unwrap_or(0.0),
            s["memory_percent"].as_f64().unwrap_or(0.0),
        );
    }
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let mut settings = CliSettings::load();
    match args {
        [] => {
            for (key, description) in CliSettings::available_keys() {
                let value = settings.get_value(key).unwrap_or_default();
                println!("{:<22} {}  — {}", key, value, description);
            }
            Ok(())
        }
        [key] => match settings.get_value(key) {
            Some(value) => {
                println!("{}", value);
                Ok(())
            }
            None => anyhow::bail!("Unknown config key '{}'", key),
        },
        [key, value] => {
            settings
                .set_value(key, value)
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            settings.save()?;
            println!("{} = {}", key, value);
            Ok(())
        }
        _ => anyhow::bail!("Usage: psm-cli config [key] [value]"),
    }
}

/// id 또는 표시 이름으로 스크립트를 찾음. id 접두사 매칭도 허용.
async fn resolve_script(client: &DaemonClient, target: &str) -> anyhow::Result<String> {
    let scripts = client.list_scripts().await?;

    let matches: Vec<&Value> = scripts
        .iter()
        .filter(|s| {
            s["id"].as_str() == Some(target)
                || s["display_name"].as_str() == Some(target)
                || s["id"].as_str().is_some_and(|id| id.starts_with(target))
        })
        .collect();

    match matches.len() {
        0 => anyhow::bail!("No script matches '{}'", target),
        1 => Ok(matches[0]["id"].as_str().unwrap_or_default().to_string()),
        n => anyhow::bail!("'{}' is ambiguous ({} matches) — use the full id", target, n),
    }
}

fn print_help() {
    println!("psm-cli — script manager client");
    println!();
    println!("USAGE:");
    println!("  psm-cli                       interactive TUI");
    println!("  psm-cli list                  list catalog with runtime status");
    println!("  psm-cli add <path> [interp]   add a script");
    println!("  psm-cli start <id|name>       start a script");
    println!("  psm-cli stop <id|name>        stop a script");
    println!("  psm-cli pause <id|name>       pause a running script");
    println!("  psm-cli resume <id|name>      resume a paused script");
    println!("  psm-cli rm <id|name>          remove from catalog (stops if running)");
    println!("  psm-cli set <id|name> <k> <v> change display_name/interpreter/autostart");
    println!("  psm-cli console <id|name> [n] print recent console lines");
    println!("  psm-cli usage                 aggregate load of all scripts");
    println!("  psm-cli settings [key value]  show or change daemon settings");
    println!("  psm-cli config [key] [value]  CLI settings");
}
