use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use serde::Serialize;
use thiserror::Error;

use super::state_machine::{RunState, StateMachine};
use crate::utils::current_timestamp;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("script '{id}' is not tracked")]
    NotFound { id: String },
    #[error("invalid state transition: {0}")]
    InvalidState(#[from] super::state_machine::TransitionError),
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },
    #[error("lock poisoned")]
    LockPoisoned,
}

/// Last sampled resource usage for one tracked script.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResourceUsage {
    /// Percent of one core over the last sampling window, clamped to [0,100]
    pub cpu_percent: f32,
    /// Resident set size in bytes
    pub memory_bytes: u64,
    /// RSS as percent of total system memory
    pub memory_percent: f32,
}

/// Runtime record for one script. 카탈로그 엔트리당 최대 하나.
struct TrackedScript {
    pid: Option<u32>,
    machine: StateMachine,
    start_time: u64,
    usage: ResourceUsage,
}

/// Read-only snapshot of a runtime record, for IPC listings.
#[derive(Debug, Clone, Serialize)]
pub struct TrackedView {
    pub pid: Option<u32>,
    pub state: RunState,
    pub start_time: u64,
    pub usage: ResourceUsage,
}

/// Tracks the runtime state of every active script, keyed by script id.
pub struct ProcessTracker {
    processes: Mutex<HashMap<String, TrackedScript>>,
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
        }
    }
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex 락 획득 헬퍼 — 보일러플레이트 제거
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, TrackedScript>>, ProcessError> {
        self.processes.lock().map_err(|e| {
            tracing::error!("ProcessTracker lock poisoned: {}", e);
            ProcessError::LockPoisoned
        })
    }

    /// Track a freshly spawned script process.
    pub fn track(&self, id: &str, pid: u32) -> Result<(), ProcessError> {
        let mut machine = StateMachine::new();
        // 새 레코드는 stopped에서 출발하므로 실패할 수 없는 전이
        machine.transition(RunState::Starting)?;
        machine.transition(RunState::Running)?;

        let record = TrackedScript {
            pid: Some(pid),
            machine,
            start_time: current_timestamp(),
            usage: ResourceUsage::default(),
        };
        let mut processes = self.lock()?;
        processes.insert(id.to_string(), record);
        tracing::info!("Now tracking script '{}' with pid {}", id, pid);
        Ok(())
    }

    pub fn get_pid(&self, id: &str) -> Result<u32, ProcessError> {
        let processes = self.lock()?;
        processes
            .get(id)
            .and_then(|p| p.pid)
            .ok_or(ProcessError::NotFound { id: id.to_string() })
    }

    pub fn get_state(&self, id: &str) -> Result<RunState, ProcessError> {
        let processes = self.lock()?;
        processes
            .get(id)
            .map(|p| p.machine.state)
            .ok_or(ProcessError::NotFound { id: id.to_string() })
    }

    /// Drive the record's state machine. Invalid transitions are rejected.
    pub fn transition(&self, id: &str, to: RunState) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        let record = processes
            .get_mut(id)
            .ok_or(ProcessError::NotFound { id: id.to_string() })?;
        record.machine.transition(to)?;
        if to == RunState::Paused {
            // 일시정지 중에는 0으로 표시
            record.usage = ResourceUsage::default();
        }
        Ok(())
    }

    /// Mark a script as crashed after the monitor lost its process.
    /// PID와 표시 메트릭을 함께 비웁니다.
    pub fn mark_crashed(&self, id: &str) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        if let Some(record) = processes.get_mut(id) {
            record.machine.transition(RunState::Crashed)?;
            record.pid = None;
            record.usage = ResourceUsage::default();
            tracing::warn!("Script '{}' marked as crashed", id);
        }
        Ok(())
    }

    /// Store the latest monitor sample for a running script.
    pub fn set_usage(&self, id: &str, usage: ResourceUsage) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        let record = processes
            .get_mut(id)
            .ok_or(ProcessError::NotFound { id: id.to_string() })?;
        record.usage = usage;
        Ok(())
    }

    #[allow(dead_code)] // 공개 API — 외부 호출자/테스트용
    pub fn get_usage(&self, id: &str) -> Result<ResourceUsage, ProcessError> {
        let processes = self.lock()?;
        processes
            .get(id)
            .map(|p| p.usage)
            .ok_or(ProcessError::NotFound { id: id.to_string() })
    }

    /// Snapshot for IPC listings. 없는 id는 stopped로 간주하면 됩니다.
    pub fn view(&self, id: &str) -> Option<TrackedView> {
        let processes = self.lock().ok()?;
        processes.get(id).map(|p| TrackedView {
            pid: p.pid,
            state: p.machine.state,
            start_time: p.start_time,
            usage: p.usage,
        })
    }

    /// ids of records currently in a state that the monitor should sample
    pub fn monitorable_ids(&self) -> Vec<String> {
        match self.lock() {
            Ok(processes) => processes
                .iter()
                .filter(|(_, p)| p.machine.state == RunState::Running)
                .map(|(id, _)| id.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Stop tracking a script (record removed, reads as stopped afterwards).
    pub fn untrack(&self, id: &str) -> Result<(), ProcessError> {
        let mut processes = self.lock()?;
        processes
            .remove(id)
            .ok_or(ProcessError::NotFound { id: id.to_string() })?;
        tracing::info!("Stopped tracking script '{}'", id);
        Ok(())
    }
}

// ─── OS signal helpers ───────────────────────────────────────

/// Terminate a process by PID. `force`면 즉시 강제 종료 (크로스 플랫폼).
pub fn terminate_pid(pid: u32, force: bool) -> Result<(), ProcessError> {
    let signal_name = if force { "KILL" } else { "TERM" };
    tracing::info!("Sending {} to pid {}", signal_name, pid);

    #[cfg(target_os = "windows")]
    {
        use winapi::um::handleapi::CloseHandle;
        use winapi::um::processthreadsapi::{OpenProcess, TerminateProcess};
        use winapi::um::winnt::PROCESS_TERMINATE;

        unsafe {
            let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
            if handle.is_null() {
                return Err(ProcessError::SignalFailed {
                    pid,
                    reason: "OpenProcess failed".to_string(),
                });
            }
            let exit_code = if force { 1 } else { 0 };
            let result = TerminateProcess(handle, exit_code);
            CloseHandle(handle);
            if result == 0 {
                return Err(ProcessError::SignalFailed {
                    pid,
                    reason: "TerminateProcess failed".to_string(),
                });
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        signal::kill(Pid::from_raw(pid as i32), signal).map_err(|e| {
            ProcessError::SignalFailed {
                pid,
                reason: e.to_string(),
            }
        })?;
        Ok(())
    }
}

/// Suspend a running process (pause).
#[cfg(not(target_os = "windows"))]
pub fn suspend_pid(pid: u32) -> Result<(), ProcessError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGSTOP).map_err(|e| {
        ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        }
    })
}

/// Resume a suspended process.
#[cfg(not(target_os = "windows"))]
pub fn resume_pid(pid: u32) -> Result<(), ProcessError> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGCONT).map_err(|e| {
        ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        }
    })
}

/// Suspend a running process (pause).
///
/// Windows에는 프로세스 단위 suspend 시스템콜이 공개되어 있지 않으므로
/// 스레드 스냅샷을 순회하며 SuspendThread를 호출합니다.
#[cfg(target_os = "windows")]
pub fn suspend_pid(pid: u32) -> Result<(), ProcessError> {
    each_thread_of(pid, |handle| unsafe {
        winapi::um::processthreadsapi::SuspendThread(handle);
    })
}

/// Resume a suspended process.
#[cfg(target_os = "windows")]
pub fn resume_pid(pid: u32) -> Result<(), ProcessError> {
    each_thread_of(pid, |handle| unsafe {
        winapi::um::processthreadsapi::ResumeThread(handle);
    })
}

#[cfg(target_os = "windows")]
fn each_thread_of(
    pid: u32,
    f: impl Fn(winapi::um::winnt::HANDLE),
) -> Result<(), ProcessError> {
    use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
    use winapi::um::processthreadsapi::OpenThread;
    use winapi::um::tlhelp32::{
        CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
    };
    use winapi::um::winnt::THREAD_SUSPEND_RESUME;

    unsafe {
        let snapshot = CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0);
        if snapshot == INVALID_HANDLE_VALUE {
            return Err(ProcessError::SignalFailed {
                pid,
                reason: "CreateToolhelp32Snapshot failed".to_string(),
            });
        }

        let mut entry: THREADENTRY32 = std::mem::zeroed();
        entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;
        let mut touched = 0u32;

        if Thread32First(snapshot, &mut entry) != 0 {
            loop {
                if entry.th32OwnerProcessID == pid {
                    let handle = OpenThread(THREAD_SUSPEND_RESUME, 0, entry.th32ThreadID);
                    if !handle.is_null() {
                        f(handle);
                        CloseHandle(handle);
                        touched += 1;
                    }
                }
                if Thread32Next(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }
        CloseHandle(snapshot);

        if touched == 0 {
            return Err(ProcessError::SignalFailed {
                pid,
                reason: "no threads found for process".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_get_state() {
        let tracker = ProcessTracker::new();
        tracker.track("job-a", 1234).unwrap();
        assert_eq!(tracker.get_state("job-a").unwrap(), RunState::Running);
        assert_eq!(tracker.get_pid("job-a").unwrap(), 1234);
    }

    #[test]
    fn test_not_found() {
        let tracker = ProcessTracker::new();
        assert!(tracker.get_state("nonexistent").is_err());
        assert!(tracker.get_pid("nonexistent").is_err());
        assert!(tracker.view("nonexistent").is_none());
    }

    #[test]
    fn test_pause_zeroes_displayed_usage() {
        let tracker = ProcessTracker::new();
        tracker.track("job", 42).unwrap();
        tracker
            .set_usage("job", ResourceUsage {
                cpu_percent: 55.0,
                memory_bytes: 1024,
                memory_percent: 2.0,
            })
            .unwrap();

        tracker.transition("job", RunState::Paused).unwrap();
        let usage = tracker.get_usage("job").unwrap();
        assert_eq!(usage.cpu_percent, 0.0);
        assert_eq!(usage.memory_bytes, 0);
        // PID는 유지
        assert_eq!(tracker.get_pid("job").unwrap(), 42);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let tracker = ProcessTracker::new();
        tracker.track("job", 42).unwrap();
        tracker.transition("job", RunState::Paused).unwrap();
        // paused -> paused는 거부
        assert!(tracker.transition("job", RunState::Paused).is_err());
    }

    #[test]
    fn test_mark_crashed_clears_pid_and_usage() {
        let tracker = ProcessTracker::new();
        tracker.track("job", 42).unwrap();
        tracker
            .set_usage("job", ResourceUsage {
                cpu_percent: 10.0,
                memory_bytes: 4096,
                memory_percent: 1.0,
            })
            .unwrap();

        tracker.mark_crashed("job").unwrap();
        let view = tracker.view("job").unwrap();
        assert_eq!(view.state, RunState::Crashed);
        assert!(view.pid.is_none());
        assert_eq!(view.usage.cpu_percent, 0.0);
        assert!(tracker.get_pid("job").is_err());
    }

    #[test]
    fn test_mark_crashed_unknown_is_silent() {
        let tracker = ProcessTracker::new();
        assert!(tracker.mark_crashed("ghost").is_ok());
    }

    #[test]
    fn test_untrack() {
        let tracker = ProcessTracker::new();
        tracker.track("job", 1234).unwrap();
        tracker.untrack("job").unwrap();
        assert!(tracker.get_state("job").is_err());
        assert!(tracker.untrack("job").is_err());
    }

    #[test]
    fn test_monitorable_ids_excludes_paused() {
        let tracker = ProcessTracker::new();
        tracker.track("a", 1).unwrap();
        tracker.track("b", 2).unwrap();
        tracker.transition("b", RunState::Paused).unwrap();

        let ids = tracker.monitorable_ids();
        assert_eq!(ids, vec!["a".to_string()]);
    }

    #[test]
    fn test_multiple_scripts_independent() {
        let tracker = ProcessTracker::new();
        tracker.track("a", 100).unwrap();
        tracker.track("b", 200).unwrap();

        tracker.mark_crashed("a").unwrap();
        assert_eq!(tracker.get_state("a").unwrap(), RunState::Crashed);
        assert_eq!(tracker.get_state("b").unwrap(), RunState::Running);

        tracker.untrack("a").unwrap();
        assert_eq!(tracker.get_pid("b").unwrap(), 200);
    }

    #[test]
    fn test_retrack_after_crash() {
        let tracker = ProcessTracker::new();
        tracker.track("job", 100).unwrap();
        tracker.mark_crashed("job").unwrap();
        // 재시작 — 새 PID로 덮어쓰기
        tracker.track("job", 200).unwrap();
        assert_eq!(tracker.get_state("job").unwrap(), RunState::Running);
        assert_eq!(tracker.get_pid("job").unwrap(), 200);
    }
}
