//! Capture worker lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of one capture worker, in order.
///
/// Transitions are linear. The only shortcut is `Configuring -> Closed` when
/// the device cannot be opened or configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    /// Opening the device and applying settings.
    Configuring,

    /// Retrieving and publishing frames.
    Acquiring,

    /// Stopping acquisition and closing the device.
    Stopping,

    /// Terminal; the worker thread exits.
    Closed,
}

impl WorkerState {
    /// Returns the next state on the normal path, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Configuring => Some(Self::Acquiring),
            Self::Acquiring => Some(Self::Stopping),
            Self::Stopping => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns true if `to` is a legal successor of this state.
    pub fn can_transition_to(self, to: Self) -> bool {
        self.next() == Some(to) || (self == Self::Configuring && to == Self::Closed)
    }

    /// Returns true for the terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Configuring => "Configuring",
            Self::Acquiring => "Acquiring",
            Self::Stopping => "Stopping",
            Self::Closed => "Closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_path() {
        let mut state = WorkerState::Configuring;
        let mut path = vec![state];
        while let Some(next) = state.next() {
            assert!(state.can_transition_to(next));
            state = next;
            path.push(state);
        }
        assert_eq!(
            path,
            [
                WorkerState::Configuring,
                WorkerState::Acquiring,
                WorkerState::Stopping,
                WorkerState::Closed
            ]
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_no_cycles_back() {
        assert!(WorkerState::Configuring.can_transition_to(WorkerState::Closed));
        assert!(!WorkerState::Acquiring.can_transition_to(WorkerState::Configuring));
        assert!(!WorkerState::Stopping.can_transition_to(WorkerState::Acquiring));
        assert!(!WorkerState::Acquiring.can_transition_to(WorkerState::Closed));
        assert!(!WorkerState::Closed.can_transition_to(WorkerState::Configuring));
    }
}
