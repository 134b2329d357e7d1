//! Progress state shared by every resumable job.

use serde::{Deserialize, Serialize};

/// Step counters and progress messages for one job.
///
/// `current_step` only ever increases and `is_complete` never resets, so a
/// persisted state can be resumed after a crash without going backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub total_steps: usize,
    current_step: usize,
    is_complete: bool,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn advance(&mut self) {
        self.current_step += 1;
    }

    pub fn complete(&mut self) {
        self.is_complete = true;
    }

    pub fn add_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// `ceil(total / batch_size)`; zero when there is nothing to do.
pub fn steps_for(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total.div_ceil(batch_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_for() {
        assert_eq!(steps_for(20, 5), 4);
        assert_eq!(steps_for(21, 5), 5);
        assert_eq!(steps_for(1, 100), 1);
        assert_eq!(steps_for(0, 10), 0);
    }

    #[test]
    fn test_state_is_monotonic() {
        let mut state = JobState::new();
        state.advance();
        state.advance();
        state.complete();
        state.complete();
        assert_eq!(state.current_step(), 2);
        assert!(state.is_complete());
    }

    #[test]
    fn test_state_survives_persistence() {
        let mut state = JobState::new();
        state.total_steps = 3;
        state.advance();
        state.add_message("Indexed 10 documents");

        let json = serde_json::to_string(&state).unwrap();
        let restored: JobState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
