//! Errors returned by the command framework.

use std::fmt;

use thiserror::Error;

use crate::{command::CommandPath, module::Role};

/// Errors returned while composing modules or dispatching a command.
#[derive(Debug, Error)]
pub enum Error {
    /// Two registrations claim the same slot.
    #[error("collision: {0}")]
    Collision(Collision),

    /// No module is registered under the requested role and identifier.
    #[error("no {role} backend named `{id}` (available: {})", list_or_none(available))]
    NotFound {
        /// The requested role.
        role: Role,
        /// The requested identifier.
        id: String,
        /// The identifiers registered for `role`, in registration order.
        available: Vec<String>,
    },

    /// A module was asked for a role it does not declare.
    #[error("module `{id}` does not provide a {role} backend")]
    UnsupportedRole {
        /// The module identifier.
        id: String,
        /// The requested role.
        role: Role,
    },

    /// A module rejected the supplied configuration.
    #[error("invalid configuration for {role} backend `{id}`: {source:#}")]
    Configuration {
        /// The role being configured.
        role: Role,
        /// The module identifier.
        id: String,
        /// The module's own description of the problem.
        source: anyhow::Error,
    },

    /// A command path is empty or contains an invalid segment.
    #[error("invalid command path `{path}`")]
    InvalidPath {
        /// The rejected path.
        path: CommandPath,
    },

    /// A command was inserted after the command tree was sealed.
    #[error("command tree is sealed, cannot insert `{path}`")]
    Sealed {
        /// The path that was being inserted.
        path: CommandPath,
    },

    /// The arguments do not select a runnable command.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The logging pipeline could not be installed.
    #[error("failed to initialize observability: {0:#}")]
    Observability(anyhow::Error),

    /// The dispatched command failed.
    #[error(transparent)]
    Handler(anyhow::Error),
}

/// The slot two registrations fought over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Collision {
    /// Two modules registered the same identifier for the same role.
    Backend {
        /// The contested role.
        role: Role,
        /// The contested identifier.
        id: String,
    },
    /// Two fragments claimed the same command path.
    Command {
        /// The contested path.
        path: CommandPath,
    },
    /// A fragment declared an argument that a global flag already uses.
    GlobalArg {
        /// The command declaring the argument.
        path: CommandPath,
        /// The id of the global flag.
        arg: String,
    },
}

impl fmt::Display for Collision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { role, id } => {
                write!(f, "{role} backend `{id}` is registered more than once")
            }
            Self::Command { path } => write!(f, "command `{path}` is defined more than once"),
            Self::GlobalArg { path, arg } => {
                write!(f, "command `{path}` redefines the global flag `{arg}`")
            }
        }
    }
}

/// The argument vector does not match a runnable command.
#[derive(Debug, Error)]
#[error("{message}{}", hint(nearest, suggestions))]
pub struct UsageError {
    /// The rendered parser message.
    pub message: String,
    /// The deepest command path that matched the arguments.
    pub nearest: CommandPath,
    /// The commands available under `nearest`.
    pub suggestions: Vec<String>,
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn hint(nearest: &CommandPath, suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        return String::new();
    }
    let scope = if nearest.is_root() {
        "available commands".to_string()
    } else {
        format!("available commands under `{nearest}`")
    };
    format!("\n{scope}: {}", suggestions.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_lists_available_identifiers() {
        let err = Error::NotFound {
            role: Role::Chain,
            id: "cosmos".to_string(),
            available: vec!["ethereum".to_string(), "mock".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "no chain backend named `cosmos` (available: ethereum, mock)"
        );
    }

    #[test]
    fn usage_error_names_the_nearest_subtree() {
        let err = UsageError {
            message: "error: unrecognized subcommand 'lst'".to_string(),
            nearest: CommandPath::from(["chains"]),
            suggestions: vec!["list".to_string(), "check".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "error: unrecognized subcommand 'lst'\navailable commands under `chains`: list, check"
        );
    }
}
