mod config;
mod ipc;
mod process_monitor;
mod script;
mod supervisor;
mod utils;

use std::sync::Arc;
use tokio::sync::RwLock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    tracing::info!("psm core daemon starting");

    let catalog_path =
        std::env::var("PSM_SCRIPTS_PATH").unwrap_or_else(|_| "./scripts.json".to_string());
    let settings_path =
        std::env::var("PSM_SETTINGS_PATH").unwrap_or_else(|_| "./settings.json".to_string());

    let supervisor = Arc::new(RwLock::new(supervisor::Supervisor::new(
        &catalog_path,
        &settings_path,
    )));
    let (listen_addr, monitor_interval) = {
        let mut sup = supervisor.write().await;
        if let Err(e) = sup.initialize().await {
            tracing::warn!("Failed to initialize supervisor: {}", e);
        }
        (
            sup.settings.listen_addr.clone(),
            sup.settings.monitor_interval_secs,
        )
    };

    let ipc_server = ipc::IPCServer::new(supervisor.clone(), &listen_addr);

    // 백그라운드 리소스 모니터링 태스크 시작
    let supervisor_monitor = supervisor.clone();
    tokio::spawn(async move {
        let mut error_count = 0;
        let max_consecutive_errors = 10;

        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(monitor_interval.max(1))).await;

            let mut sup = supervisor_monitor.write().await;
            match sup.monitor_processes().await {
                Ok(_) => {
                    if error_count > 0 {
                        tracing::info!("Monitor recovered after {} errors", error_count);
                    }
                    error_count = 0;
                }
                Err(e) => {
                    error_count += 1;
                    if error_count <= 3 || error_count % 10 == 0 {
                        // 처음 3번과 이후 10번마다 로깅하여 반복 로그 방지
                        tracing::error!("Monitor error (count: {}): {}", error_count, e);
                    }

                    if error_count >= max_consecutive_errors {
                        tracing::error!(
                            "Monitor has failed {} consecutive times, resetting",
                            error_count
                        );
                        error_count = 0;
                    }
                }
            }
        }
    });

    // Graceful shutdown: Ctrl+C / SIGTERM 시 자식 프로세스 정리
    let supervisor_shutdown = supervisor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received, stopping scripts...");

        let mut sup = supervisor_shutdown.write().await;
        sup.shutdown_all().await;

        tracing::info!("Cleanup complete, exiting");
        std::process::exit(0);
    });

    if let Err(e) = ipc_server.start().await {
        tracing::error!("IPC server error: {}", e);
    }

    tracing::info!("psm core daemon shutting down");
    Ok(())
}
