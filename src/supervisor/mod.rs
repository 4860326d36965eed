pub mod error;
pub mod managed_script;
pub mod process;
pub mod state_machine;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::process_monitor::{ResourceSampler, SampleError};
use crate::script::{ScriptCatalog, ScriptEntry};
use error::SupervisorError;
use managed_script::{ManagedScript, ScriptRelayStore};
use process::ProcessTracker;
use state_machine::RunState;

/// Grace period between SIGTERM and the forced kill on stop.
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct Supervisor {
    pub tracker: ProcessTracker,
    pub catalog: ScriptCatalog,
    pub relays: ScriptRelayStore,
    pub settings: Settings,
    settings_path: PathBuf,
    sampler: ResourceSampler,
}

impl Supervisor {
    pub fn new(catalog_path: &str, settings_path: &str) -> Self {
        let settings_path = PathBuf::from(settings_path);
        let settings = Settings::load(&settings_path);
        Self {
            tracker: ProcessTracker::new(),
            catalog: ScriptCatalog::new(catalog_path),
            relays: ScriptRelayStore::new(),
            settings,
            settings_path,
            sampler: ResourceSampler::new(),
        }
    }

    /// Load the catalog and bring autostart-flagged scripts back up.
    pub async fn initialize(&mut self) -> Result<()> {
        self.catalog.load()?;
        tracing::info!("Loaded {} scripts", self.catalog.list().len());

        let autostart_ids: Vec<String> = self
            .catalog
            .list()
            .iter()
            .filter(|e| e.autostart)
            .map(|e| e.id.clone())
            .collect();

        for id in autostart_ids {
            // 이전 세션에서 실행 중이던 스크립트 복원 — 실패는 로깅만
            match self.start_script(&id).await {
                Ok(_) => tracing::info!("Autostarted script '{}'", id),
                Err(e) => tracing::warn!("Autostart of '{}' failed: {}", id, e),
            }
        }
        Ok(())
    }

    // ─── Catalog operations ──────────────────────────────────

    /// Add a script to the catalog. Name is derived from the file stem.
    pub fn add_script(
        &mut self,
        path: &str,
        interpreter: Option<&str>,
        args: Vec<String>,
    ) -> Result<ScriptEntry, SupervisorError> {
        let interpreter = interpreter
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.settings.default_interpreter)
            .to_string();
        let mut entry = ScriptEntry::new(path, &interpreter);
        entry.args = args;
        self.catalog.add(entry.clone()).map_err(SupervisorError::Internal)?;
        tracing::info!("Added script '{}' ({})", entry.display_name, entry.id);
        Ok(entry)
    }

    /// Apply a partial update (rename / interpreter / args / autostart).
    pub fn update_script(
        &mut self,
        id: &str,
        patch: &Value,
    ) -> Result<ScriptEntry, SupervisorError> {
        let mut entry = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::ScriptNotFound(id.to_string()))?;

        if let Some(name) = patch.get("display_name").and_then(|v| v.as_str()) {
            if name.trim().is_empty() {
                return Err(SupervisorError::InvalidRequest(
                    "display_name must not be empty".to_string(),
                ));
            }
            entry.display_name = name.to_string();
        }
        if let Some(interpreter) = patch.get("interpreter").and_then(|v| v.as_str()) {
            entry.interpreter = interpreter.to_string();
        }
        if let Some(args) = patch.get("args").and_then(|v| v.as_array()) {
            entry.args = args
                .iter()
                .filter_map(|a| a.as_str().map(String::from))
                .collect();
        }
        if let Some(autostart) = patch.get("autostart").and_then(|v| v.as_bool()) {
            entry.autostart = autostart;
        }

        self.catalog
            .update(id, entry.clone())
            .map_err(SupervisorError::Internal)?;
        Ok(entry)
    }

    /// Remove a script from the catalog. A running process is stopped first
    /// and the runtime record dropped, so no active view survives the entry.
    pub async fn remove_script(&mut self, id: &str) -> Result<Value, SupervisorError> {
        if self.catalog.get(id).is_none() {
            return Err(SupervisorError::ScriptNotFound(id.to_string()));
        }

        if let Some(view) = self.tracker.view(id) {
            if view.state.is_active() {
                if let Err(e) = self.stop_script(id).await {
                    tracing::warn!("Stop during removal of '{}' failed: {}", id, e);
                }
            }
            // crashed 레코드 등 남은 런타임 상태 정리
            let _ = self.tracker.untrack(id);
        }
        self.relays.remove(id).await;
        self.catalog.remove(id).map_err(SupervisorError::Internal)?;

        tracing::info!("Removed script '{}'", id);
        Ok(json!({ "success": true, "id": id }))
    }

    // ─── Lifecycle operations ────────────────────────────────

    /// Start a script: verify the file exists, spawn interpreter + path,
    /// track the PID and seed the CPU sample.
    pub async fn start_script(&mut self, id: &str) -> Result<Value, SupervisorError> {
        let entry = self
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| SupervisorError::ScriptNotFound(id.to_string()))?;

        if let Some(view) = self.tracker.view(id) {
            // stopping 중에도 재시작 불가 — stopped/crashed만 시작 가능
            if !view.state.is_startable() {
                return Err(SupervisorError::AlreadyRunning(entry.display_name));
            }
        }

        if !std::path::Path::new(&entry.path).exists() {
            return Err(SupervisorError::ScriptFileMissing(entry.path));
        }

        let interpreter = if entry.interpreter.is_empty() {
            self.settings.default_interpreter.clone()
        } else {
            entry.interpreter.clone()
        };

        tracing::info!(
            "Starting script '{}' ({} {})",
            entry.display_name,
            interpreter,
            entry.path
        );

        let relay = ManagedScript::spawn(
            &interpreter,
            &entry.args,
            &entry.path,
            Some(&self.settings.level_pattern),
            self.settings.log_buffer_size,
        )
        .await
        .map_err(|e| SupervisorError::SpawnFailed {
            program: interpreter.clone(),
            reason: e.to_string(),
        })?;

        let pid = relay.pid;
        self.relays.insert(id, relay).await;
        self.tracker
            .track(id, pid)
            .map_err(|e| SupervisorError::Internal(e.into()))?;
        self.sampler.seed(pid);

        // 실행 상태를 카탈로그에 보존 — 데몬 재기동 시 복원됨
        if let Err(e) = self.catalog.set_autostart(id, true) {
            tracing::warn!("Failed to persist running state: {}", e);
        }

        Ok(json!({
            "success": true,
            "id": id,
            "pid": pid,
            "message": format!("Script '{}' started with PID {}", entry.display_name, pid)
        }))
    }

    /// Stop a script: SIGTERM, bounded wait, SIGKILL. Clears the runtime
    /// record so PID reads as absent and metrics read as zero.
    pub async fn stop_script(&mut self, id: &str) -> Result<Value, SupervisorError> {
        let view = self
            .tracker
            .view(id)
            .filter(|v| v.state.is_active())
            .ok_or_else(|| SupervisorError::NotRunning(id.to_string()))?;
        let pid = view
            .pid
            .ok_or_else(|| SupervisorError::NotRunning(id.to_string()))?;

        tracing::info!("Stopping script '{}' (pid {})", id, pid);
        let _ = self.tracker.transition(id, RunState::Stopping);

        // 일시정지 상태면 먼저 깨워야 TERM이 전달됨
        if view.state == RunState::Paused {
            if let Err(e) = process::resume_pid(pid) {
                tracing::debug!("Resume before stop failed: {}", e);
            }
        }

        if let Err(e) = process::terminate_pid(pid, false) {
            // 이미 죽었을 수 있음 — 로깅 후 계속
            tracing::debug!("Terminate failed: {}", e);
        }

        let exited = match self.relays.get(id).await {
            Some(relay) => tokio::time::timeout(STOP_GRACE, relay.wait_for_exit())
                .await
                .is_ok(),
            None => {
                // relay 없이 추적된 경우 — 폴링으로 종료 대기
                let deadline = tokio::time::Instant::now() + STOP_GRACE;
                loop {
                    if !crate::process_monitor::is_running_async(pid).await {
                        break true;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        break false;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        };

        if !exited {
            tracing::warn!("Script '{}' did not exit within {:?}, force killing", id, STOP_GRACE);
            if let Err(e) = process::terminate_pid(pid, true) {
                tracing::warn!("Force kill failed: {}", e);
            }
        }

        self.relays.remove(id).await;
        self.sampler.forget(pid);
        let _ = self.tracker.untrack(id);
        if let Err(e) = self.catalog.set_autostart(id, false) {
            tracing::warn!("Failed to persist stopped state: {}", e);
        }

        Ok(json!({
            "success": true,
            "id": id,
            "message": format!("Script '{}' stopped", id)
        }))
    }

    /// Pause a running script (SIGSTOP / thread suspension).
    pub fn pause_script(&mut self, id: &str) -> Result<Value, SupervisorError> {
        let state = self
            .tracker
            .get_state(id)
            .map_err(|_| SupervisorError::NotRunning(id.to_string()))?;
        if state != RunState::Running {
            return Err(SupervisorError::NotRunning(id.to_string()));
        }
        let pid = self
            .tracker
            .get_pid(id)
            .map_err(|_| SupervisorError::NotRunning(id.to_string()))?;

        process::suspend_pid(pid).map_err(|e| SupervisorError::SignalFailed {
            pid,
            reason: e.to_string(),
        })?;
        self.tracker
            .transition(id, RunState::Paused)
            .map_err(|e| SupervisorError::Internal(e.into()))?;
        // 재개 시 첫 델타가 튀지 않도록 이전 샘플 폐기
        self.sampler.forget(pid);

        tracing::info!("Paused script '{}' (pid {})", id, pid);
        Ok(json!({ "success": true, "id": id, "message": "paused" }))
    }

    /// Resume a paused script (SIGCONT / thread resumption).
    pub fn resume_script(&mut self, id: &str) -> Result<Value, SupervisorError> {
        let state = self
            .tracker
            .get_state(id)
            .map_err(|_| SupervisorError::NotRunning(id.to_string()))?;
        if state != RunState::Paused {
            return Err(SupervisorError::NotPaused(id.to_string()));
        }
        let pid = self
            .tracker
            .get_pid(id)
            .map_err(|_| SupervisorError::NotRunning(id.to_string()))?;

        process::resume_pid(pid).map_err(|e| SupervisorError::SignalFailed {
            pid,
            reason: e.to_string(),
        })?;
        self.tracker
            .transition(id, RunState::Running)
            .map_err(|e| SupervisorError::Internal(e.into()))?;
        self.sampler.seed(pid);

        tracing::info!("Resumed script '{}' (pid {})", id, pid);
        Ok(json!({ "success": true, "id": id, "message": "resumed" }))
    }

    // ─── Console ─────────────────────────────────────────────

    /// Console lines, either everything after `since` or the `recent` tail.
    pub async fn console_output(
        &self,
        id: &str,
        since: Option<u64>,
        recent: Option<usize>,
    ) -> Result<Vec<managed_script::LogLine>, SupervisorError> {
        if self.catalog.get(id).is_none() {
            return Err(SupervisorError::ScriptNotFound(id.to_string()));
        }
        let relay = match self.relays.get(id).await {
            Some(r) => r,
            // 아직 한 번도 실행되지 않음 — 빈 히스토리
            None => return Ok(Vec::new()),
        };
        Ok(match since {
            Some(since_id) => relay.console_since(since_id).await,
            None => relay.recent_console(recent.unwrap_or(200)).await,
        })
    }

    /// Forward a console input line to the script's stdin.
    pub async fn send_stdin(&self, id: &str, input: &str) -> Result<(), SupervisorError> {
        let relay = self
            .relays
            .get(id)
            .await
            .filter(|r| r.is_running())
            .ok_or_else(|| SupervisorError::NotRunning(id.to_string()))?;
        relay
            .send_input(input)
            .await
            .map_err(SupervisorError::Internal)
    }

    // ─── Monitoring ──────────────────────────────────────────

    /// One monitor tick: sample every running script, store usage, and mark
    /// scripts whose process disappeared as crashed.
    pub async fn monitor_processes(&mut self) -> Result<()> {
        let mut sampled = 0;
        let mut reaped = 0;

        for id in self.tracker.monitorable_ids() {
            let pid = match self.tracker.get_pid(&id) {
                Ok(pid) => pid,
                Err(_) => continue,
            };

            match self.sampler.sample(pid) {
                Ok(usage) => {
                    sampled += 1;
                    if let Err(e) = self.tracker.set_usage(&id, usage) {
                        tracing::debug!("Usage update for '{}' failed: {}", id, e);
                    }
                }
                Err(SampleError::Gone { .. }) => {
                    reaped += 1;
                    tracing::warn!(
                        "Process {} for script '{}' is no longer running",
                        pid,
                        id
                    );
                    if let Err(e) = self.tracker.mark_crashed(&id) {
                        tracing::error!("Failed to mark '{}' crashed: {}", id, e);
                    }
                    if let Err(e) = self.catalog.set_autostart(&id, false) {
                        tracing::debug!("Failed to clear autostart for '{}': {}", id, e);
                    }
                }
            }
        }

        tracing::debug!("Monitor cycle: {} sampled, {} reaped", sampled, reaped);
        Ok(())
    }

    /// Aggregate load over all running scripts, clamped for display.
    pub fn aggregate_usage(&self) -> (f32, f32) {
        let mut total_cpu = 0.0f32;
        let mut total_memory = 0.0f32;
        for entry in self.catalog.list() {
            if let Some(view) = self.tracker.view(&entry.id) {
                total_cpu += view.usage.cpu_percent;
                total_memory += view.usage.memory_percent;
            }
        }
        (total_cpu.min(100.0), total_memory.min(100.0))
    }

    /// Persist updated settings (from `PUT /api/settings`).
    pub fn save_settings(&self) -> Result<(), SupervisorError> {
        self.settings
            .save(&self.settings_path)
            .map_err(SupervisorError::Internal)
    }

    /// Stop every active script. Called on daemon shutdown.
    pub async fn shutdown_all(&mut self) {
        let ids: Vec<String> = self
            .catalog
            .list()
            .iter()
            .map(|e| e.id.clone())
            .collect();
        for id in ids {
            let active = self
                .tracker
                .view(&id)
                .map(|v| v.state.is_active())
                .unwrap_or(false);
            if active {
                // 종료 시에는 실행 상태를 보존해 다음 기동에서 복원
                let was_autostart = self
                    .catalog
                    .get(&id)
                    .map(|e| e.autostart)
                    .unwrap_or(false);
                if let Err(e) = self.stop_script(&id).await {
                    tracing::warn!("[Shutdown] Failed to stop '{}': {}", id, e);
                }
                if was_autostart {
                    let _ = self.catalog.set_autostart(&id, true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor_in(dir: &tempfile::TempDir) -> Supervisor {
        let catalog = dir.path().join("scripts.json");
        let settings = dir.path().join("settings.json");
        Supervisor::new(catalog.to_str().unwrap(), settings.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_initialization_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);
        sup.initialize().await.unwrap();
        assert_eq!(sup.catalog.list().len(), 0);
    }

    #[tokio::test]
    async fn test_add_and_update_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);

        let entry = sup.add_script("/tmp/job.py", None, vec![]).unwrap();
        assert_eq!(entry.name, "job");
        // 인터프리터 미지정 시 기본값 사용
        assert_eq!(entry.interpreter, sup.settings.default_interpreter);

        let patch = json!({ "display_name": "nightly", "args": ["-u"] });
        let updated = sup.update_script(&entry.id, &patch).unwrap();
        assert_eq!(updated.display_name, "nightly");
        assert_eq!(updated.args, vec!["-u"]);

        // 빈 이름 거부
        assert!(sup.update_script(&entry.id, &json!({ "display_name": " " })).is_err());
    }

    #[tokio::test]
    async fn test_start_unknown_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);
        let result = sup.start_script("no-such-id").await;
        assert!(matches!(result, Err(SupervisorError::ScriptNotFound(_))));
    }

    #[tokio::test]
    async fn test_start_missing_file_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);

        let entry = sup.add_script("/nonexistent/job.py", None, vec![]).unwrap();
        let result = sup.start_script(&entry.id).await;
        assert!(matches!(result, Err(SupervisorError::ScriptFileMissing(_))));
        // 상태 변화 없음
        assert!(sup.tracker.view(&entry.id).is_none());
    }

    #[tokio::test]
    async fn test_stop_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);
        let entry = sup.add_script("/tmp/job.py", None, vec![]).unwrap();
        let result = sup.stop_script(&entry.id).await;
        assert!(matches!(result, Err(SupervisorError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_monitor_cycle_on_empty_supervisor() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);
        for _ in 0..3 {
            assert!(sup.monitor_processes().await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_aggregate_usage_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor_in(&dir);
        let (cpu, mem) = sup.aggregate_usage();
        assert_eq!(cpu, 0.0);
        assert_eq!(mem, 0.0);
    }

    #[tokio::test]
    async fn test_console_for_never_started_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut sup = supervisor_in(&dir);
        let entry = sup.add_script("/tmp/job.py", None, vec![]).unwrap();
        let lines = sup.console_output(&entry.id, None, None).await.unwrap();
        assert!(lines.is_empty());

        let missing = sup.console_output("ghost", None, None).await;
        assert!(matches!(missing, Err(SupervisorError::ScriptNotFound(_))));
    }
}
