use log::{debug, warn};
use std::env;
use std::io;

use crate::shell::executor::Executor;
use crate::shell::output::{FileSink, OutputSink};
use crate::shell::parser::{parse_pipeline, ParseError, Pipeline, StageDescriptor};
use crate::utils::path::current_dir;

const DEFAULT_HISTORY_COUNT: usize = 20;
const PS_SUMMARY: &str = "ps aux | head -n 12";

const HELP_TEXT: &str = "\
NeoShell - interactive command line

BUILT-IN COMMANDS:
  cd [dir]         - Change directory (cd ~ for home)
  pwd              - Print working directory
  exit [code]      - Exit the shell
  help             - Show this help message
  history [n]      - Show last n commands
  ps [args]        - Show process information

FEATURES:
  Piping              : command1 | command2 | command3
  I/O Redirection     : > (write), >> (append), < (read)
  Command History     : UP/DOWN arrows

EXAMPLES:
  ls -la | grep .rs          # Pipe: list and filter
  ls > files.txt             # Redirect to file
  cat < input.txt > out.txt  # Read from and write to files
";

/// 内建命令执行后 shell 的走向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue(i32),
    Exit(i32),
}

pub struct BuiltinContext<'a> {
    pub executor: &'a Executor,
    pub sink: &'a mut dyn OutputSink,
    pub history: &'a [String],
    pub last_status: i32,
}

pub type Handler = fn(&StageDescriptor, &mut BuiltinContext<'_>) -> Flow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Cd,
    Pwd,
    Exit,
    Help,
    History,
    Ps,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::Cd,
        Builtin::Pwd,
        Builtin::Exit,
        Builtin::Help,
        Builtin::History,
        Builtin::Ps,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Cd => "cd",
            Builtin::Pwd => "pwd",
            Builtin::Exit => "exit",
            Builtin::Help => "help",
            Builtin::History => "history",
            Builtin::Ps => "ps",
        }
    }

    pub fn handler(self) -> Handler {
        match self {
            Builtin::Cd => builtin_cd,
            Builtin::Pwd => builtin_pwd,
            Builtin::Exit => builtin_exit,
            Builtin::Help => builtin_help,
            Builtin::History => builtin_history,
            Builtin::Ps => builtin_ps,
        }
    }

    /// 单阶段管道且程序名是内建命令时才由 shell 自己处理
    pub fn for_pipeline(pipeline: &Pipeline) -> Option<Self> {
        if pipeline.is_single() {
            Self::lookup(&pipeline.first().program)
        } else {
            None
        }
    }

    /// 执行内建命令。`ps` 把重定向交给执行器，其余命令的输出重定向由 shell 写文件完成。
    pub fn run(self, stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
        debug!("执行内建命令: {}", stage);
        if self == Builtin::Ps {
            return builtin_ps(stage, ctx);
        }
        if stage.input_path.is_some() {
            warn!("内建命令 {} 不读取标准输入，忽略输入重定向", self.name());
        }
        match &stage.output_path {
            Some(path) => self.run_redirected(stage, path, ctx),
            None => (self.handler())(stage, ctx),
        }
    }

    fn run_redirected(
        self,
        stage: &StageDescriptor,
        path: &str,
        ctx: &mut BuiltinContext<'_>,
    ) -> Flow {
        let file = match FileSink::open_target(path, stage.append_output) {
            Ok(file) => file,
            Err(e) => {
                ctx.sink.error(&format!("{}: {}", path, e));
                return Flow::Continue(1);
            }
        };
        let mut sink = FileSink::new(path, file, &mut *ctx.sink);
        let mut redirected = BuiltinContext {
            executor: ctx.executor,
            sink: &mut sink,
            history: ctx.history,
            last_status: ctx.last_status,
        };
        (self.handler())(stage, &mut redirected)
    }
}

fn builtin_cd(stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    let target = stage.arguments.first().map(String::as_str).unwrap_or("~");
    let path = match shellexpand::full(target) {
        Ok(path) => path.into_owned(),
        Err(e) => {
            ctx.sink.error(&format!("cd: {}", e));
            return Flow::Continue(1);
        }
    };

    match env::set_current_dir(&path) {
        Ok(()) => Flow::Continue(0),
        Err(e) => {
            let reason = match e.kind() {
                io::ErrorKind::NotFound => "No such file or directory".to_string(),
                io::ErrorKind::PermissionDenied => "Permission denied".to_string(),
                _ => e.to_string(),
            };
            ctx.sink.error(&format!("cd: {}: {}", path, reason));
            Flow::Continue(1)
        }
    }
}

fn builtin_pwd(_stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    let dir = current_dir();
    if dir.is_empty() {
        return Flow::Continue(1);
    }
    ctx.sink.info(&dir);
    Flow::Continue(0)
}

fn builtin_exit(stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    match stage.arguments.first() {
        None => Flow::Exit(ctx.last_status),
        Some(code) => match code.parse::<i32>() {
            Ok(code) => Flow::Exit(code),
            Err(_) => {
                ctx.sink
                    .error(&format!("exit: {}: numeric argument required", code));
                Flow::Exit(2)
            }
        },
    }
}

fn builtin_help(_stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    ctx.sink.info(HELP_TEXT);
    Flow::Continue(0)
}

/// 最近 `count` 条历史记录，序号从 1 开始
pub fn history_lines(entries: &[String], count: usize) -> Vec<String> {
    let start = entries.len().saturating_sub(count);
    entries[start..]
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("{:4}  {}", start + i + 1, entry))
        .collect()
}

fn builtin_history(stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    let count = stage
        .arguments
        .first()
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HISTORY_COUNT);
    for line in history_lines(ctx.history, count) {
        ctx.sink.info(&line);
    }
    Flow::Continue(0)
}

/// 不带参数时显示进程概览，重定向挂在概览管道的两端
fn ps_pipeline(stage: &StageDescriptor) -> Result<Pipeline, ParseError> {
    if stage.arguments.is_empty() {
        Ok(parse_pipeline(PS_SUMMARY)?.with_redirections_of(stage))
    } else {
        Ok(Pipeline::single(stage.clone()))
    }
}

fn builtin_ps(stage: &StageDescriptor, ctx: &mut BuiltinContext<'_>) -> Flow {
    let pipeline = match ps_pipeline(stage) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            ctx.sink.error(&format!("ps: {}", e));
            return Flow::Continue(1);
        }
    };

    let result = ctx.executor.execute(pipeline);
    ctx.sink.report(&result);
    Flow::Continue(result.exit_status())
}
