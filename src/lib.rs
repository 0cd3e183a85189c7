//! NeoShell: an interactive shell built around a small pipeline engine.
//!
//! - [`shell::parser`] turns a line into a [`Pipeline`](shell::parser::Pipeline)
//!   of stages with `<`, `>` and `>>` redirections.
//! - [`shell::executor`] launches one process per stage, wires the pipes and
//!   reports every stage's status and stderr in order.
//! - [`shell::Shell`] is the REPL on top: prompt, history, builtins.

pub mod shell;
pub mod utils;
