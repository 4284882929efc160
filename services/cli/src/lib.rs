mod cli;
mod config;
mod infra;
mod telemetry;

pub use cli::{run, CliError};
