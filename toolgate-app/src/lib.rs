pub mod cli;
pub mod commands;

pub use cli::{parse_args, Command, Invocation, UsageError, USAGE};
pub use commands::run;
