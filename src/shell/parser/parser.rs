use log::debug;

use super::ast::{Pipeline, RedirectOp, StageDescriptor};
use super::lexer::{is_blank, tokenize};
use super::ParseError;

const PIPE: char = '|';

/// 解析单个阶段的单词序列：第一个单词是程序名，其余是参数和重定向
pub fn parse_command(tokens: &[String]) -> Result<StageDescriptor, ParseError> {
    let (program, rest) = tokens.split_first().ok_or(ParseError::EmptyCommand)?;
    if program.is_empty() {
        return Err(ParseError::EmptyCommand);
    }
    let mut stage = StageDescriptor::new(program.clone());

    let mut iter = rest.iter();
    while let Some(token) = iter.next() {
        let Some(op) = RedirectOp::from_token(token) else {
            stage.arguments.push(token.clone());
            continue;
        };

        // 同类重定向出现多次时后者覆盖前者
        let filename = iter.next().ok_or(ParseError::MissingFilename(op))?;
        match op {
            RedirectOp::Input => stage.input_path = Some(filename.clone()),
            RedirectOp::Output | RedirectOp::Append => {
                stage.output_path = Some(filename.clone());
                stage.append_output = op == RedirectOp::Append;
            }
        }
    }

    Ok(stage)
}

/// 按 `|` 切分整行并逐段解析。切分发生在原始文本上，不感知引号。
pub fn parse_pipeline(line: &str) -> Result<Pipeline, ParseError> {
    let mut stages = Vec::new();

    for segment in line.split(PIPE) {
        let segment = segment.trim_matches(is_blank);
        if segment.is_empty() {
            return Err(ParseError::EmptyStage);
        }

        let tokens = tokenize(segment)?;
        stages.push(parse_command(&tokens)?);
    }

    debug!("解析管道: {} 个阶段", stages.len());
    Pipeline::from_stages(stages).ok_or(ParseError::EmptyCommand)
}
