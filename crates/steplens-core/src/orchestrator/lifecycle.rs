//! Per-question state machine.
//!
//! ```text
//! Created -> Invoking -> Invoked -> Summarizing -> Judging -> Reporting -> Done
//!    \__________\__________\___________\____________\___________\______> Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{EvalError, Result};
use crate::obs;

pub const STAGE_AGENT_PROCESSING: &str = "Agent Processing";
pub const STAGE_EVALUATION: &str = "Evaluation";
pub const STAGE_CANCELLED: &str = "Manually Stopped Evaluation Job";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionState {
    Created,
    Invoking,
    Invoked,
    Summarizing,
    Judging,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for QuestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl QuestionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QuestionState::Done | QuestionState::Failed)
    }

    pub fn can_transition(self, to: QuestionState) -> bool {
        use QuestionState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Created, Invoking)
            | (Invoking, Invoked)
            | (Invoked, Summarizing)
            | (Summarizing, Judging)
            | (Judging, Reporting)
            | (Reporting, Done) => true,
            _ => false,
        }
    }

    /// Stage name recorded on the error trace when failing from this state.
    pub fn failure_stage(self) -> &'static str {
        match self {
            QuestionState::Created | QuestionState::Invoking | QuestionState::Invoked => {
                STAGE_AGENT_PROCESSING
            }
            _ => STAGE_EVALUATION,
        }
    }
}

/// Tracks one question's walk through [`QuestionState`].
#[derive(Debug, Clone)]
pub struct QuestionLifecycle {
    question_id: String,
    state: QuestionState,
    history: Vec<QuestionState>,
}

impl QuestionLifecycle {
    pub fn new(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
            state: QuestionState::Created,
            history: vec![QuestionState::Created],
        }
    }

    pub fn state(&self) -> QuestionState {
        self.state
    }

    pub fn history(&self) -> &[QuestionState] {
        &self.history
    }

    pub fn advance(&mut self, to: QuestionState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(EvalError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        obs::emit_state_transition(&self.question_id, &self.state.to_string(), &to.to_string());
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Move to `Failed`, returning the stage the failure belongs to.
    pub fn fail(&mut self) -> Result<&'static str> {
        let stage = self.state.failure_stage();
        self.advance(QuestionState::Failed)?;
        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use QuestionState::*;

    #[test]
    fn happy_path_is_accepted() {
        let mut lc = QuestionLifecycle::new("q");
        for next in [Invoking, Invoked, Summarizing, Judging, Reporting, Done] {
            lc.advance(next).unwrap();
        }
        assert_eq!(lc.state(), Done);
        assert_eq!(lc.history().len(), 7);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut lc = QuestionLifecycle::new("q");
        let err = lc.advance(Judging).unwrap_err();
        assert!(matches!(err, EvalError::InvalidTransition { .. }));
        assert_eq!(lc.state(), Created);
    }

    #[test]
    fn failed_is_reachable_from_every_live_state_and_absorbing() {
        for state in [Created, Invoking, Invoked, Summarizing, Judging, Reporting] {
            assert!(state.can_transition(Failed), "{state} -> Failed");
        }
        assert!(!Done.can_transition(Failed));
        assert!(!Failed.can_transition(Invoking));
        assert!(!Failed.can_transition(Failed));
    }

    #[test]
    fn failure_stage_follows_state() {
        let mut lc = QuestionLifecycle::new("q");
        lc.advance(Invoking).unwrap();
        assert_eq!(lc.fail().unwrap(), STAGE_AGENT_PROCESSING);

        let mut lc = QuestionLifecycle::new("q");
        for next in [Invoking, Invoked, Summarizing, Judging] {
            lc.advance(next).unwrap();
        }
        assert_eq!(lc.fail().unwrap(), STAGE_EVALUATION);
        assert!(lc.fail().is_err());
    }
}
