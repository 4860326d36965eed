//! Per-process resource sampling on top of sysinfo.
//!
//! CPU percent is computed from deltas of cumulative CPU time against the
//! wall clock, the way the dashboard expects it: sampled once per monitor
//! tick, clamped to [0,100]. sysinfo의 자체 cpu_usage()는 쓰지 않습니다 —
//! 샘플 주기를 모니터가 소유해야 하기 때문입니다.

use std::collections::HashMap;
use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;

use crate::supervisor::process::ResourceUsage;

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("process {pid} no longer exists")]
    Gone { pid: u32 },
}

/// Previous observation for the delta computation.
#[derive(Debug, Clone, Copy)]
struct CpuSample {
    cpu_time_ms: u64,
    taken_at: Instant,
}

/// (cumulative cpu time delta / wall clock delta) * 100, clamped to [0,100].
fn cpu_percent_from_deltas(cpu_ms_delta: u64, wall_ms_delta: u128) -> f32 {
    if wall_ms_delta == 0 {
        return 0.0;
    }
    let pct = (cpu_ms_delta as f64 / wall_ms_delta as f64) * 100.0;
    pct.clamp(0.0, 100.0) as f32
}

/// Stateful sampler owning the sysinfo handle and per-PID previous samples.
pub struct ResourceSampler {
    sys: System,
    total_memory: u64,
    previous: HashMap<u32, CpuSample>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        let total_memory = sys.total_memory();
        Self {
            sys,
            total_memory,
            previous: HashMap::new(),
        }
    }

    fn refresh_pid(&mut self, pid: u32) -> bool {
        let sysinfo_pid = Pid::from_u32(pid);
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sysinfo_pid]),
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );
        self.sys.process(sysinfo_pid).is_some()
    }

    /// Record an initial CPU sample right after spawn, so the first monitor
    /// tick computes a delta over the real interval instead of process
    /// lifetime. 실패해도 치명적이지 않으므로 결과만 반환합니다.
    pub fn seed(&mut self, pid: u32) {
        if !self.refresh_pid(pid) {
            return;
        }
        let cpu_time_ms = self
            .sys
            .process(Pid::from_u32(pid))
            .map(|p| p.accumulated_cpu_time())
            .unwrap_or(0);
        self.previous.insert(pid, CpuSample {
            cpu_time_ms,
            taken_at: Instant::now(),
        });
    }

    /// Take one sample. `Err(Gone)` means the process has exited or became
    /// unreadable — the caller marks the script stopped/crashed.
    pub fn sample(&mut self, pid: u32) -> Result<ResourceUsage, SampleError> {
        if !self.refresh_pid(pid) {
            self.previous.remove(&pid);
            return Err(SampleError::Gone { pid });
        }
        let process = self
            .sys
            .process(Pid::from_u32(pid))
            .ok_or(SampleError::Gone { pid })?;

        let now = Instant::now();
        let cpu_time_ms = process.accumulated_cpu_time();
        let memory_bytes = process.memory();

        let cpu_percent = match self.previous.get(&pid) {
            Some(prev) => {
                let wall_ms = now.duration_since(prev.taken_at).as_millis();
                if wall_ms == 0 {
                    // 같은 틱 안에서 두 번 불린 경우 — 이전 샘플 유지
                    return Ok(ResourceUsage {
                        cpu_percent: 0.0,
                        memory_bytes,
                        memory_percent: self.memory_percent(memory_bytes),
                    });
                }
                let cpu_delta = cpu_time_ms.saturating_sub(prev.cpu_time_ms);
                cpu_percent_from_deltas(cpu_delta, wall_ms)
            }
            None => 0.0,
        };

        self.previous.insert(pid, CpuSample {
            cpu_time_ms,
            taken_at: now,
        });

        Ok(ResourceUsage {
            cpu_percent,
            memory_bytes,
            memory_percent: self.memory_percent(memory_bytes),
        })
    }

    fn memory_percent(&self, rss: u64) -> f32 {
        if self.total_memory == 0 {
            return 0.0;
        }
        ((rss as f64 / self.total_memory as f64) * 100.0) as f32
    }

    /// Drop the remembered sample for a PID (stop/crash/resume re-seed).
    pub fn forget(&mut self, pid: u32) {
        self.previous.remove(&pid);
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// 특정 PID가 실행 중인지 확인 (크로스 플랫폼)
pub fn is_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    sys.process(Pid::from_u32(pid)).is_some()
}

// ── Async wrappers ─────────────────────────────────────────
// sysinfo 시스템 콜은 동기적으로 OS 프로세스 테이블을 읽습니다.
// tokio 워커 스레드에서 직접 호출하면 런타임이 블로킹되므로,
// spawn_blocking을 통해 전용 블로킹 스레드풀에서 실행합니다.

/// `is_running`의 비동기 래퍼.
pub async fn is_running_async(pid: u32) -> bool {
    tokio::task::spawn_blocking(move || is_running(pid))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_percent_clamped_low() {
        assert_eq!(cpu_percent_from_deltas(0, 1000), 0.0);
    }

    #[test]
    fn test_cpu_percent_clamped_high() {
        // 멀티스레드 프로세스는 wall 델타보다 큰 CPU 델타를 낼 수 있음
        assert_eq!(cpu_percent_from_deltas(5000, 1000), 100.0);
    }

    #[test]
    fn test_cpu_percent_zero_wall_delta() {
        assert_eq!(cpu_percent_from_deltas(1000, 0), 0.0);
    }

    #[test]
    fn test_cpu_percent_midrange() {
        let pct = cpu_percent_from_deltas(500, 1000);
        assert!((pct - 50.0).abs() < 0.01, "expected ~50%, got {}", pct);
    }

    #[test]
    fn test_sample_own_process() {
        let mut sampler = ResourceSampler::new();
        let pid = std::process::id();

        sampler.seed(pid);
        let usage = sampler.sample(pid).expect("own process must be sampleable");
        assert!(usage.cpu_percent >= 0.0 && usage.cpu_percent <= 100.0);
        assert!(usage.memory_bytes > 0);
        assert!(usage.memory_percent >= 0.0 && usage.memory_percent <= 100.0);
    }

    #[test]
    fn test_sample_gone_process() {
        let mut sampler = ResourceSampler::new();
        // PID 공간의 끝자락 — 실존할 가능성이 사실상 없음
        let result = sampler.sample(u32::MAX - 1);
        assert!(matches!(result, Err(SampleError::Gone { .. })));
    }

    #[test]
    fn test_forget_clears_previous() {
        let mut sampler = ResourceSampler::new();
        let pid = std::process::id();
        sampler.seed(pid);
        assert!(sampler.previous.contains_key(&pid));
        sampler.forget(pid);
        assert!(!sampler.previous.contains_key(&pid));
    }

    #[test]
    fn test_is_running_self() {
        assert!(is_running(std::process::id()));
        assert!(!is_running(u32::MAX - 1));
    }
}
