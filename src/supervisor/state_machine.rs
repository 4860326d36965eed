use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run state of a tracked script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Crashed,
}

impl RunState {
    /// 새로 start 할 수 있는 상태인지
    pub fn is_startable(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Crashed)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Starting | RunState::Running | RunState::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Stopped => "stopped",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopping => "stopping",
            RunState::Crashed => "crashed",
        }
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(RunState, RunState),
}

pub struct StateMachine {
    pub state: RunState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: RunState::Stopped }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &RunState) -> bool {
        matches!(
            (&self.state, to),
            (RunState::Stopped, RunState::Starting)
                | (RunState::Starting, RunState::Running)
                | (RunState::Starting, RunState::Crashed)
                | (RunState::Running, RunState::Paused)
                | (RunState::Paused, RunState::Running)
                | (RunState::Running, RunState::Stopping)
                | (RunState::Paused, RunState::Stopping)
                | (RunState::Running, RunState::Crashed)
                | (RunState::Paused, RunState::Crashed)
                | (RunState::Stopping, RunState::Stopped)
                | (RunState::Stopping, RunState::Crashed)
                | (RunState::Crashed, RunState::Starting)
                | (RunState::Crashed, RunState::Stopped)
        )
    }

    pub fn transition(&mut self, to: RunState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::debug!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state, to))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_lifecycle() {
        let mut sm = StateMachine::new();
        assert_eq!(sm.state, RunState::Stopped);
        assert!(sm.transition(RunState::Starting).is_ok());
        assert!(sm.transition(RunState::Running).is_ok());
        assert!(sm.transition(RunState::Stopping).is_ok());
        assert!(sm.transition(RunState::Stopped).is_ok());
    }

    #[test]
    fn pause_resume_cycle() {
        let mut sm = StateMachine::new();
        sm.transition(RunState::Starting).unwrap();
        sm.transition(RunState::Running).unwrap();
        assert!(sm.transition(RunState::Paused).is_ok());
        assert!(sm.transition(RunState::Running).is_ok());
        assert!(sm.transition(RunState::Paused).is_ok());
        // 일시정지 상태에서 바로 종료 가능
        assert!(sm.transition(RunState::Stopping).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        let mut sm = StateMachine::new();
        // stopped에서 바로 running/paused 불가
        assert!(sm.transition(RunState::Running).is_err());
        assert!(sm.transition(RunState::Paused).is_err());

        sm.transition(RunState::Starting).unwrap();
        sm.transition(RunState::Running).unwrap();
        sm.transition(RunState::Paused).unwrap();
        // paused -> paused 불가
        assert!(sm.transition(RunState::Paused).is_err());
    }

    #[test]
    fn crashed_can_restart() {
        let mut sm = StateMachine::new();
        sm.transition(RunState::Starting).unwrap();
        sm.transition(RunState::Running).unwrap();
        sm.transition(RunState::Crashed).unwrap();
        assert!(sm.state.is_startable());
        assert!(sm.transition(RunState::Starting).is_ok());
    }

    #[test]
    fn startable_predicate() {
        assert!(RunState::Stopped.is_startable());
        assert!(RunState::Crashed.is_startable());
        assert!(!RunState::Running.is_startable());
        assert!(!RunState::Paused.is_startable());
        assert!(RunState::Paused.is_active());
        assert!(!RunState::Crashed.is_active());
    }
}
