mod args;
mod commands;
mod handlers;
mod logging;
pub mod types;

pub use args::{CacheCommand, Cli, Commands};
pub use commands::run;
