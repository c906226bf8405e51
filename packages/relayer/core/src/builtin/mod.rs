//! Commands every relayer binary has, regardless of the modules it carries.

mod chains;
mod config;
mod modules;

use crate::command::CommandFragment;

/// Owner name recorded for built-in fragments.
pub const OWNER: &str = "relayer";

/// The built-in command fragments, groups first.
pub fn fragments() -> Vec<CommandFragment> {
    [config::fragments(), chains::fragments(), modules::fragments()].concat()
}
