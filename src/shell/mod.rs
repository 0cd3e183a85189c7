pub mod builtins;
pub mod executor;
pub mod output;
pub mod parser;
pub mod readline;
pub mod signals;
#[allow(clippy::module_inception)]
mod shell;

pub use shell::Shell;
