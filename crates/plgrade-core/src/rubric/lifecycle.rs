//! Grading lifecycle of an instance question

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GradeError, Result};
use crate::bail_invalid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingState {
    #[default]
    Ungraded,
    AutoGraded,
    ManualGraded,
    AiGraded,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingEvent {
    AutoGrade,
    ManualGrade,
    AiGrade,
    Finalize,
    NewSubmission,
}

impl GradingState {
    /// Apply `event`, returning the next state.
    ///
    /// A new submission restarts the lifecycle from any state. A human
    /// grade overrides an AI grade but not the reverse. Re-running the auto
    /// grader leaves a manual or AI grade in place.
    pub fn transition(self, event: GradingEvent) -> Result<GradingState> {
        use GradingEvent as E;
        use GradingState as S;

        let next = match (self, event) {
            (_, E::NewSubmission) => S::Ungraded,
            (S::Ungraded | S::AutoGraded, E::AutoGrade) => S::AutoGraded,
            (S::ManualGraded | S::AiGraded, E::AutoGrade) => self,
            (S::AutoGraded | S::AiGraded | S::ManualGraded, E::ManualGrade) => S::ManualGraded,
            (S::AutoGraded | S::AiGraded, E::AiGrade) => S::AiGraded,
            (S::ManualGraded | S::AiGraded, E::Finalize) => S::Finalized,
            (state, event) => {
                bail_invalid!(
                    "grading transition",
                    format!("{event} is not allowed from {state}"),
                )
            }
        };
        Ok(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GradingState::Ungraded => "ungraded",
            GradingState::AutoGraded => "auto_graded",
            GradingState::ManualGraded => "manual_graded",
            GradingState::AiGraded => "ai_graded",
            GradingState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for GradingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradingState {
    type Err = GradeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ungraded" => Ok(GradingState::Ungraded),
            "auto_graded" => Ok(GradingState::AutoGraded),
            "manual_graded" => Ok(GradingState::ManualGraded),
            "ai_graded" => Ok(GradingState::AiGraded),
            "finalized" => Ok(GradingState::Finalized),
            other => Err(GradeError::invalid_input("grading state", other)),
        }
    }
}

impl fmt::Display for GradingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GradingEvent::AutoGrade => "auto_grade",
            GradingEvent::ManualGrade => "manual_grade",
            GradingEvent::AiGrade => "ai_grade",
            GradingEvent::Finalize => "finalize",
            GradingEvent::NewSubmission => "new_submission",
        };
        f.write_str(name)
    }
}
