#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NoArgAction {
    Help,
    Quit,
    Generate,
    Status,
    Angles,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SingleArgAction {
    Regenerate,
    SetPoseId,
    SetSource,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec<A> {
    pub command: &'static str,
    pub action: A,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec<NoArgAction>] = &[
    CommandSpec {
        command: "help",
        action: NoArgAction::Help,
    },
    CommandSpec {
        command: "quit",
        action: NoArgAction::Quit,
    },
    CommandSpec {
        command: "exit",
        action: NoArgAction::Quit,
    },
    CommandSpec {
        command: "generate",
        action: NoArgAction::Generate,
    },
    CommandSpec {
        command: "status",
        action: NoArgAction::Status,
    },
    CommandSpec {
        command: "angles",
        action: NoArgAction::Angles,
    },
];

/// Commands whose whole argument is one value (quotes allowed).
pub(crate) const SINGLE_ARG_COMMANDS: &[CommandSpec<SingleArgAction>] = &[
    CommandSpec {
        command: "regen",
        action: SingleArgAction::Regenerate,
    },
    CommandSpec {
        command: "regenerate",
        action: SingleArgAction::Regenerate,
    },
    CommandSpec {
        command: "id",
        action: SingleArgAction::SetPoseId,
    },
    CommandSpec {
        command: "source",
        action: SingleArgAction::SetSource,
    },
];

/// `save <angle> [dir]`
pub(crate) const SAVE_COMMAND: &str = "save";
/// `export [dir]`
pub(crate) const EXPORT_COMMAND: &str = "export";

pub const SESSION_HELP_COMMANDS: &[&str] = &[
    "/generate",
    "/regen <angle>",
    "/save <angle> [dir]",
    "/export [dir]",
    "/id <pose id>",
    "/source <path>",
    "/status",
    "/angles",
    "/help",
    "/quit",
];
