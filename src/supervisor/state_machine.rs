use serde::Serialize;
use thiserror::Error;

/// Lifecycle states of the managed server process.
///
/// `Failed` is only reachable from `Starting` (launch died inside the probe
/// window) or `Running` (process died without a stop request). A `Stopping`
/// process that exits goes to `Stopped` regardless of exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl ServerState {
    /// Whether `start` is allowed from this state.
    pub fn can_launch(&self) -> bool {
        matches!(self, ServerState::Stopped | ServerState::Failed)
    }
}

#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("invalid transition: {0:?} -> {1:?}")]
    InvalidTransition(ServerState, ServerState),
}

pub struct StateMachine {
    pub state: ServerState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self { state: ServerState::Stopped }
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_transition(&self, to: &ServerState) -> bool {
        matches!(
            (&self.state, to),
            (ServerState::Stopped, ServerState::Starting)
                | (ServerState::Starting, ServerState::Running)
                | (ServerState::Starting, ServerState::Failed)
                | (ServerState::Running, ServerState::Stopping)
                | (ServerState::Running, ServerState::Failed)
                | (ServerState::Stopping, ServerState::Stopped)
                | (ServerState::Failed, ServerState::Starting)
                | (ServerState::Failed, ServerState::Stopped)
        )
    }

    pub fn transition(&mut self, to: ServerState) -> Result<(), TransitionError> {
        if self.can_transition(&to) {
            tracing::info!("State transition: {:?} -> {:?}", self.state, to);
            self.state = to;
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition(self.state.clone(), to))
        }
    }
}
