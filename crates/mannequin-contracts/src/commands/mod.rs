mod command_registry;
mod parser;

pub use command_registry::SESSION_HELP_COMMANDS;
pub use parser::{parse_command, SessionCommand};
