mod commands;

pub use commands::{Cli, Commands, ServeArgs, UserCommands};
