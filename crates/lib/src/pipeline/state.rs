//! Build state machine.
//!
//! ```text
//! Idle -> PrereqCheck -> Resolving -> Vendoring -> Staging -> Templating -> Packaging -> Done
//!   \__________\______________\___________\___________\____________\____________\-> Failed
//! ```
//!
//! `Done` and `Failed` are terminal. A failed build is never resumed; it is
//! re-run from `Idle`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  PrereqCheck,
  Resolving,
  Vendoring,
  Staging,
  Templating,
  Packaging,
}

impl Stage {
  pub const ALL: [Stage; 6] = [
    Stage::PrereqCheck,
    Stage::Resolving,
    Stage::Vendoring,
    Stage::Staging,
    Stage::Templating,
    Stage::Packaging,
  ];

  pub fn next(self) -> Option<Stage> {
    let pos = Self::ALL.iter().position(|s| *s == self)?;
    Self::ALL.get(pos + 1).copied()
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::PrereqCheck => "prerequisite check",
      Stage::Resolving => "resolving",
      Stage::Vendoring => "vendoring",
      Stage::Staging => "staging",
      Stage::Templating => "templating",
      Stage::Packaging => "packaging",
    }
  }
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum BuildState {
  Idle,
  Running(Stage),
  Done,
  /// Carries the stage that was running, if any.
  Failed(Option<Stage>),
}

impl BuildState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, BuildState::Done | BuildState::Failed(_))
  }
}

impl fmt::Display for BuildState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildState::Idle => f.write_str("idle"),
      BuildState::Running(stage) => write!(f, "{}", stage),
      BuildState::Done => f.write_str("done"),
      BuildState::Failed(Some(stage)) => write!(f, "failed during {}", stage),
      BuildState::Failed(None) => f.write_str("failed before starting"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid build state transition from {from}")]
pub struct TransitionError {
  pub from: BuildState,
}

/// Tracks the current state and every state visited.
#[derive(Debug, Clone)]
pub struct StateMachine {
  state: BuildState,
  history: Vec<BuildState>,
}

impl Default for StateMachine {
  fn default() -> Self {
    Self::new()
  }
}

impl StateMachine {
  pub fn new() -> Self {
    Self {
      state: BuildState::Idle,
      history: vec![BuildState::Idle],
    }
  }

  pub fn state(&self) -> BuildState {
    self.state
  }

  pub fn history(&self) -> &[BuildState] {
    &self.history
  }

  /// Move to the next stage, or to `Done` after the last one.
  pub fn advance(&mut self) -> Result<BuildState, TransitionError> {
    let next = match self.state {
      BuildState::Idle => BuildState::Running(Stage::PrereqCheck),
      BuildState::Running(stage) => stage.next().map_or(BuildState::Done, BuildState::Running),
      terminal => return Err(TransitionError { from: terminal }),
    };
    Ok(self.enter(next))
  }

  /// Move to `Failed`, from any non-terminal state.
  pub fn fail(&mut self) -> Result<BuildState, TransitionError> {
    let next = match self.state {
      BuildState::Idle => BuildState::Failed(None),
      BuildState::Running(stage) => BuildState::Failed(Some(stage)),
      terminal => return Err(TransitionError { from: terminal }),
    };
    Ok(self.enter(next))
  }

  fn enter(&mut self, state: BuildState) -> BuildState {
    self.state = state;
    self.history.push(state);
    state
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn full_run_visits_every_stage_in_order() {
    let mut machine = StateMachine::new();
    while !machine.state().is_terminal() {
      machine.advance().unwrap();
    }

    let mut expected = vec![BuildState::Idle];
    expected.extend(Stage::ALL.iter().map(|s| BuildState::Running(*s)));
    expected.push(BuildState::Done);
    assert_eq!(machine.history(), expected.as_slice());
  }

  #[test]
  fn failure_is_absorbing() {
    let mut machine = StateMachine::new();
    machine.advance().unwrap();
    machine.advance().unwrap();
    assert_eq!(machine.fail().unwrap(), BuildState::Failed(Some(Stage::Resolving)));

    assert!(machine.advance().is_err());
    assert!(machine.fail().is_err());
    assert_eq!(machine.state(), BuildState::Failed(Some(Stage::Resolving)));
  }

  #[test]
  fn idle_can_fail() {
    let mut machine = StateMachine::new();
    assert_eq!(machine.fail().unwrap(), BuildState::Failed(None));
  }

  #[test]
  fn done_is_terminal() {
    let mut machine = StateMachine::new();
    for _ in 0..=Stage::ALL.len() {
      machine.advance().unwrap();
    }
    assert_eq!(machine.state(), BuildState::Done);
    assert_eq!(machine.advance(), Err(TransitionError { from: BuildState::Done }));
    assert!(machine.fail().is_err());
  }

  #[test]
  fn state_display() {
    assert_eq!(BuildState::Running(Stage::Vendoring).to_string(), "vendoring");
    assert_eq!(BuildState::Failed(Some(Stage::Staging)).to_string(), "failed during staging");
  }
}
