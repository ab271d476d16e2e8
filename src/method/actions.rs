//! Per-step action list.

use std::fmt;

/// A single evaluate-then-store command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Evaluate expression `name` and store the result in its own slot.
    SelfUpdate(String),
    /// Evaluate expression `source` and scatter the result into `target`.
    CrossUpdate { target: String, source: String },
}

impl Command {
    pub fn self_update(name: impl Into<String>) -> Self {
        Self::SelfUpdate(name.into())
    }

    pub fn cross_update(target: impl Into<String>, source: impl Into<String>) -> Self {
        Self::CrossUpdate {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Expression evaluated by this command.
    pub fn source(&self) -> &str {
        match self {
            Self::SelfUpdate(name) => name,
            Self::CrossUpdate { source, .. } => source,
        }
    }

    /// Slot written by this command.
    pub fn target(&self) -> &str {
        match self {
            Self::SelfUpdate(name) => name,
            Self::CrossUpdate { target, .. } => target,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfUpdate(name) => write!(f, "{}", name),
            Self::CrossUpdate { target, source } => write!(f, "{} <- {}", target, source),
        }
    }
}

/// One stage of a time step. Actions run strictly in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the commands once, in order.
    Evaluate(Vec<Command>),
    /// Repeat the commands while both `residual` and `step` exceed the
    /// tolerance and the iteration cap is not reached.
    IterateUntilConverged {
        commands: Vec<Command>,
        residual: String,
        step: String,
    },
}

impl Action {
    /// Commands run by this action.
    pub fn commands(&self) -> &[Command] {
        match self {
            Self::Evaluate(commands) | Self::IterateUntilConverged { commands, .. } => commands,
        }
    }
}
