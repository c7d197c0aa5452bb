//! A line-oriented command shell.
//!
//! Lines are split into `&&` links, `|` stages and `<`/`>` redirections by
//! [`parser`]. Each stage runs either a built-in implemented in Rust or an
//! external program found through `PATH`; stages of one link are connected by
//! anonymous pipes and run concurrently. Dispatched commands are recorded in a
//! [`history::HistoryStore`].
//!
//! The main entry point is [`Interpreter`], which evaluates whole command lines
//! ([`Interpreter::run_line`]) or single commands by name using a set of pluggable
//! factories. The public modules [`command`] and [`env`] expose traits and types
//! for implementing your own commands and for interacting with the process
//! environment; [`session`] drives a long-lived shell from another program.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod error;
mod external;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod parser;
mod pipeline;
pub mod session;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
