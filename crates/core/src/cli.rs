//! CLI command registry and dispatch.
//!
//! Deliberately minimal: a flat name → handler map. Argument parsing
//! beyond selecting the command belongs to the handler itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CliError;

/// A registered command. Receives the argument vector with the program
/// name and the command name already removed.
pub type CliFn = Arc<dyn Fn(Vec<String>) -> anyhow::Result<()> + Send + Sync>;

/// Per-API CLI registry.
pub struct CliApi {
    owner: String,
    commands: HashMap<String, CliFn>,
}

impl CliApi {
    pub(crate) fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            commands: HashMap::new(),
        }
    }

    pub fn add_command(&mut self, name: impl Into<String>, command: CliFn) {
        self.commands.insert(name.into(), command);
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Routes to the command named by `argv[1]`, handing it the remaining
    /// arguments. Missing or unknown command names are reported as errors;
    /// mapping them to a process exit happens in [`CliApi::run`].
    pub fn dispatch(&self, argv: &[String]) -> Result<(), CliError> {
        let Some(name) = argv.get(1) else {
            return Err(CliError::MissingCommand);
        };
        let Some(command) = self.commands.get(name) else {
            return Err(CliError::UnknownCommand(name.clone()));
        };
        command(argv[2..].to_vec()).map_err(CliError::Command)
    }

    /// Overview text listing the available commands.
    pub fn usage(&self) -> String {
        let mut names: Vec<&str> = self.commands().collect();
        names.sort_unstable();
        let mut usage = format!("{}\n\nAvailable commands:\n", self.owner);
        for name in names {
            usage.push_str(&format!("\t- {name}\n"));
        }
        usage
    }

    /// Process entry point: dispatch and exit. Missing/unknown commands and
    /// failed handlers all exit non-zero.
    pub fn run(&self, argv: impl IntoIterator<Item = String>) -> ! {
        let argv: Vec<String> = argv.into_iter().collect();
        match self.dispatch(&argv) {
            Ok(()) => std::process::exit(0),
            Err(err @ (CliError::MissingCommand | CliError::UnknownCommand(_))) => {
                tracing::error!(error = %err, "cli dispatch failed");
                eprintln!("{}", self.usage());
                std::process::exit(1)
            }
            Err(CliError::Command(err)) => {
                tracing::error!(error = %err, "command failed");
                std::process::exit(1)
            }
        }
    }
}
