use crate::error::EngineError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of a conversation engine instance.
///
/// `Starting -> Stopped` is allowed so a failed device acquisition can
/// restore the engine to a restartable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

pub struct StateManager {
    state: Arc<RwLock<EngineState>>,
    state_tx: Sender<EngineState>,
    state_rx: Receiver<EngineState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: EngineState) -> Result<(), EngineError> {
        let mut current = self.state.write();

        let valid = matches!(
            (*current, new_state),
            (EngineState::Stopped, EngineState::Starting)
                | (EngineState::Starting, EngineState::Running)
                | (EngineState::Starting, EngineState::Stopped)
                | (EngineState::Running, EngineState::Stopping)
                | (EngineState::Stopping, EngineState::Stopped)
        );

        if !valid {
            return Err(EngineError::InvalidTransition {
                from: format!("{:?}", *current),
                to: format!("{:?}", new_state),
            });
        }

        tracing::info!("State transition: {:?} -> {:?}", *current, new_state);
        *current = new_state;
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> EngineState {
        *self.state.read()
    }

    pub fn subscribe(&self) -> Receiver<EngineState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stopped() {
        let sm = StateManager::new();
        assert_eq!(sm.current(), EngineState::Stopped);
    }

    #[test]
    fn full_lifecycle_roundtrip() {
        let sm = StateManager::new();
        sm.transition(EngineState::Starting).unwrap();
        sm.transition(EngineState::Running).unwrap();
        sm.transition(EngineState::Stopping).unwrap();
        sm.transition(EngineState::Stopped).unwrap();
        assert_eq!(sm.current(), EngineState::Stopped);
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let sm = StateManager::new();
        sm.transition(EngineState::Starting).unwrap();
        sm.transition(EngineState::Stopped).unwrap();
        assert_eq!(sm.current(), EngineState::Stopped);
    }

    #[test]
    fn rejects_invalid_transition() {
        let sm = StateManager::new();
        assert!(sm.transition(EngineState::Running).is_err());
        assert_eq!(sm.current(), EngineState::Stopped);
    }

    #[test]
    fn subscribers_observe_transitions() {
        let sm = StateManager::new();
        let rx = sm.subscribe();
        sm.transition(EngineState::Starting).unwrap();
        sm.transition(EngineState::Running).unwrap();
        assert_eq!(rx.try_recv().unwrap(), EngineState::Starting);
        assert_eq!(rx.try_recv().unwrap(), EngineState::Running);
    }
}
