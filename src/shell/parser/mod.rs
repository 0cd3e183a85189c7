pub mod ast;
pub mod lexer;
#[allow(clippy::module_inception)]
pub mod parser;

use thiserror::Error;

pub use ast::{Pipeline, RedirectOp, StageDescriptor};
pub use lexer::tokenize;
pub use parser::{parse_command, parse_pipeline};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error: unterminated quote in `{0}`")]
    UnterminatedQuote(String),
    #[error("empty command")]
    EmptyCommand,
    #[error("empty command in pipeline")]
    EmptyStage,
    #[error("missing filename after {0}")]
    MissingFilename(RedirectOp),
}

impl ParseError {
    /// 解析失败时整条命令行的退出码
    pub const EXIT_STATUS: i32 = 1;
}
