use super::command_registry::{
    CommandSpec, NoArgAction, SingleArgAction, EXPORT_COMMAND, NO_ARG_COMMANDS, SAVE_COMMAND,
    SINGLE_ARG_COMMANDS,
};

/// One line typed into the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Noop,
    Help,
    Quit,
    Generate,
    Regenerate { angle: String },
    Save { angle: String, dir: Option<String> },
    Export { dir: Option<String> },
    SetPoseId { id: String },
    SetSource { path: String },
    Status,
    Angles,
    /// A known command missing its required argument.
    MissingArgument { command: String },
    Unknown { command: String, arg: String },
}

fn find_action<A: Copy>(command: &str, specs: &[CommandSpec<A>]) -> Option<A> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn single_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Parses a session line. The leading `/` is optional.
pub fn parse_command(text: &str) -> SessionCommand {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
    if body.is_empty() {
        return SessionCommand::Noop;
    }

    let command_len = body
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    let command = body[..command_len].to_ascii_lowercase();
    let arg = body[command_len..].trim();
    if command.is_empty() {
        return SessionCommand::Unknown {
            command: String::new(),
            arg: arg.to_string(),
        };
    }

    if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
        return match action {
            NoArgAction::Help => SessionCommand::Help,
            NoArgAction::Quit => SessionCommand::Quit,
            NoArgAction::Generate => SessionCommand::Generate,
            NoArgAction::Status => SessionCommand::Status,
            NoArgAction::Angles => SessionCommand::Angles,
        };
    }

    if let Some(action) = find_action(&command, SINGLE_ARG_COMMANDS) {
        let value = single_arg(arg);
        if value.is_empty() {
            return SessionCommand::MissingArgument { command };
        }
        return match action {
            SingleArgAction::Regenerate => SessionCommand::Regenerate { angle: value },
            SingleArgAction::SetPoseId => SessionCommand::SetPoseId { id: value },
            SingleArgAction::SetSource => SessionCommand::SetSource { path: value },
        };
    }

    if command == SAVE_COMMAND {
        let mut parts = split_args(arg).into_iter();
        let Some(angle) = parts.next() else {
            return SessionCommand::MissingArgument { command };
        };
        let rest: Vec<String> = parts.collect();
        let dir = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };
        return SessionCommand::Save { angle, dir };
    }

    if command == EXPORT_COMMAND {
        let dir = single_arg(arg);
        return SessionCommand::Export {
            dir: if dir.is_empty() { None } else { Some(dir) },
        };
    }

    SessionCommand::Unknown {
        command,
        arg: arg.to_string(),
    }
}
