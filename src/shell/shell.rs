use log::{debug, error, warn};
use std::env;
use std::error::Error;
use std::io::Write;

use crate::shell::builtins::{Builtin, BuiltinContext, Flow};
use crate::shell::executor::Executor;
use crate::shell::output::{ConsoleSink, OutputSink};
use crate::shell::parser::{parse_pipeline, ParseError};
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals;
use crate::utils::config::Config;
use crate::utils::path::{abbreviate_home, current_dir};
use crate::utils::theme::Theme;

pub struct Shell<'a> {
    sink: ConsoleSink,
    readline: ReadlineManager<'a>,
    executor: Executor,
    last_status: i32,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            sink: ConsoleSink::new(Theme::load(&config.theme)),
            readline: ReadlineManager::new(config)?,
            executor: Executor::new(signals::interrupt_token()),
            last_status: 0,
        })
    }

    /// 运行交互循环，返回 shell 的退出码
    pub fn run(&mut self) -> Result<i32, Box<dyn Error>> {
        debug!("初始化 NeoShell...");

        // Ctrl-C 只中断正在执行的管道，不会杀死 shell
        signals::setup_interrupt_handler()?;

        self.readline.load_history()?;

        let theme = self.sink.theme();
        println!("{}", (theme.success_style)(&theme.get_message("welcome")));
        println!("{}", (theme.warning_style)(&theme.get_message("help")));
        debug!("NeoShell 准备就绪...");

        let status = self.run_loop()?;
        self.readline.save_history()?;

        debug!("退出 NeoShell, 状态码 {}", status);
        Ok(status)
    }

    fn run_loop(&mut self) -> Result<i32, Box<dyn Error>> {
        loop {
            std::io::stdout().flush()?;
            let prompt = self.prompt();

            match self.readline.readline(&prompt) {
                Ok(line) => {
                    if let Flow::Exit(code) = self.handle_input(&line)? {
                        let theme = self.sink.theme();
                        println!("{}", (theme.success_style)(&theme.get_message("exit")));
                        return Ok(code);
                    }
                }
                Err(ReadlineError::Eof) => {
                    warn!("接收到 EOF，退出 NeoShell...");
                    let theme = self.sink.theme();
                    println!("\n{}", (theme.warning_style)(&theme.get_message("eof_signal")));
                    return Ok(self.last_status);
                }
                Err(ReadlineError::Interrupted) => {
                    let theme = self.sink.theme();
                    println!(
                        "\n{}",
                        (theme.warning_style)(&theme.get_message("interrupt_signal"))
                    );
                }
                Err(err) => {
                    error!("读取输入失败: {}", err);
                    self.sink.error(&err.to_string());
                    return Err(err.into());
                }
            }
        }
    }

    fn handle_input(&mut self, line: &str) -> Result<Flow, Box<dyn Error>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Flow::Continue(self.last_status));
        }

        self.readline.add_history(line)?;
        debug!("执行命令: {}", line);

        let flow = self.dispatch(line);
        if let Flow::Continue(status) = flow {
            self.last_status = status;
        }
        Ok(flow)
    }

    fn dispatch(&mut self, line: &str) -> Flow {
        let pipeline = match parse_pipeline(line) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.sink.parse_error(&err);
                return Flow::Continue(ParseError::EXIT_STATUS);
            }
        };

        if let Some(builtin) = Builtin::for_pipeline(&pipeline) {
            let history = self.readline.history_entries();
            let mut ctx = BuiltinContext {
                executor: &self.executor,
                sink: &mut self.sink,
                history: &history,
                last_status: self.last_status,
            };
            return builtin.run(pipeline.first(), &mut ctx);
        }

        let result = self.executor.execute(pipeline);
        self.sink.report(&result);
        Flow::Continue(result.exit_status())
    }

    fn prompt(&self) -> String {
        let user = env::var("USER").unwrap_or_else(|_| "user".to_string());
        let host = nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "host".to_string());
        let home = env::var("HOME").ok();
        let cwd = abbreviate_home(&current_dir(), home.as_deref());
        let theme = self.sink.theme();
        (theme.prompt_style)(&format!("{}@{} {} $ ", user, host, cwd))
    }
}
