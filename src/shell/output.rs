use log::warn;
use nix::sys::signal::Signal;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use crate::shell::executor::{ExecutionResult, StageStatus};
use crate::shell::parser::ParseError;
use crate::utils::theme::Theme;

/// 结果展示的出口。解析与执行引擎只返回结构化结果，由调用方交给 sink 输出。
pub trait OutputSink {
    fn parse_error(&mut self, err: &ParseError);
    fn report(&mut self, result: &ExecutionResult);
    fn error(&mut self, message: &str);
    fn info(&mut self, message: &str);
}

/// 每个失败或被信号终止的阶段对应一行描述
pub fn describe_failures(result: &ExecutionResult) -> Vec<String> {
    let multi = result.stages.len() > 1;
    result
        .stages
        .iter()
        .enumerate()
        .filter_map(|(i, stage)| {
            let text = match &stage.status {
                StageStatus::Failed(err) => err.to_string(),
                // 下游提前退出导致的 SIGPIPE 不算失败
                StageStatus::Signaled(sig) if *sig == Signal::SIGPIPE as i32 => return None,
                StageStatus::Signaled(_) => format!("{}: {}", stage.program, stage.status),
                StageStatus::Exited(_) | StageStatus::Skipped => return None,
            };
            Some(if multi {
                format!("[stage {}] {}", i + 1, text)
            } else {
                text
            })
        })
        .collect()
}

pub struct ConsoleSink {
    theme: Theme,
}

impl ConsoleSink {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    fn print_error(&self, message: &str) {
        eprintln!(
            "{} {}",
            (self.theme.error_style)(&self.theme.get_message("error_symbol")),
            (self.theme.error_style)(message)
        );
    }
}

impl OutputSink for ConsoleSink {
    fn parse_error(&mut self, err: &ParseError) {
        self.print_error(&err.to_string());
    }

    fn report(&mut self, result: &ExecutionResult) {
        let mut stderr = io::stderr().lock();
        for stage in &result.stages {
            if !stage.stderr.is_empty() {
                let _ = stderr.write_all(stage.stderr.as_bytes());
            }
        }
        let _ = stderr.flush();
        drop(stderr);

        if let Some(stdout) = &result.stdout {
            print!("{}", stdout);
        }

        let failures = describe_failures(result);
        if failures.is_empty() && !result.success() {
            eprintln!(
                "{}",
                (self.theme.warning_style)(&format!("exit status {}", result.exit_status()))
            );
        }
        for line in failures {
            self.print_error(&line);
        }
    }

    fn error(&mut self, message: &str) {
        self.print_error(message);
    }

    fn info(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// 内建命令的输出重定向：普通输出写入文件，错误仍交给外层 sink
pub struct FileSink<'a> {
    path: String,
    file: File,
    inner: &'a mut dyn OutputSink,
}

impl<'a> FileSink<'a> {
    pub fn new(path: &str, file: File, inner: &'a mut dyn OutputSink) -> Self {
        Self {
            path: path.to_string(),
            file,
            inner,
        }
    }

    /// 按 `>` 截断或按 `>>` 追加打开目标文件
    pub fn open_target(path: &str, append: bool) -> io::Result<File> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
    }
}

impl OutputSink for FileSink<'_> {
    fn parse_error(&mut self, err: &ParseError) {
        self.inner.parse_error(err);
    }

    fn report(&mut self, result: &ExecutionResult) {
        self.inner.report(result);
    }

    fn error(&mut self, message: &str) {
        self.inner.error(message);
    }

    fn info(&mut self, message: &str) {
        if let Err(e) = writeln!(self.file, "{}", message) {
            warn!("写入 {} 失败: {}", self.path, e);
            self.inner.error(&format!("{}: {}", self.path, e));
        }
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    pub errors: Vec<String>,
    pub infos: Vec<String>,
    pub reports: Vec<ExecutionResult>,
}

#[cfg(test)]
impl OutputSink for RecordingSink {
    fn parse_error(&mut self, err: &ParseError) {
        self.errors.push(err.to_string());
    }

    fn report(&mut self, result: &ExecutionResult) {
        self.reports.push(result.clone());
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn info(&mut self, message: &str) {
        self.infos.push(message.to_string());
    }
}
