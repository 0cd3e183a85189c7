use log::{debug, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::shell::parser::{Pipeline, StageDescriptor};

use super::cancel::CancelToken;
use super::result::{ExecError, ExecutionResult, StageReport, StageStatus};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const KILL_GRACE: Duration = Duration::from_secs(1);

struct RunningStage {
    index: usize,
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

pub struct Executor {
    cancel: CancelToken,
    capture_stdout: bool,
}

impl Executor {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            capture_stdout: false,
        }
    }

    /// 捕获最后一个阶段的标准输出（该阶段没有输出重定向时）
    pub fn capture_stdout(mut self, capture: bool) -> Self {
        self.capture_stdout = capture;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// 按顺序启动所有阶段，全部启动后再逐个等待
    pub fn execute(&self, pipeline: Pipeline) -> ExecutionResult {
        self.cancel.reset();
        let total = pipeline.len();
        debug!("执行管道 ({} 个阶段): {}", total, pipeline);

        let mut running: Vec<RunningStage> = Vec::with_capacity(total);
        let mut failure: Option<(usize, ExecError)> = None;
        let mut upstream: Option<ChildStdout> = None;
        let mut stdout_reader = None;

        for (index, stage) in pipeline.stages().iter().enumerate() {
            let is_last = index + 1 == total;
            match self.spawn_stage(index, total, stage, upstream.take()) {
                Ok(mut child) => {
                    debug!("阶段 {} 已启动: {} (pid {})", index, stage.program, child.id());
                    let stderr = child.stderr.take().map(drain);
                    if !is_last {
                        upstream = child.stdout.take();
                    } else if let Some(stdout) = child.stdout.take() {
                        stdout_reader = Some(drain(stdout));
                    }
                    running.push(RunningStage {
                        index,
                        child,
                        stderr,
                    });
                }
                Err(err) => {
                    warn!("阶段 {} 启动失败: {}", index, err);
                    failure = Some((index, err));
                    break;
                }
            }
        }
        // 中止时释放还没交给下游的读端，上游才能收到 EOF/SIGPIPE
        drop(upstream);

        let mut statuses = self.wait_all(&mut running, total);
        let mut stages: Vec<StageReport> = pipeline
            .stages()
            .iter()
            .map(|stage| StageReport {
                program: stage.program.clone(),
                status: StageStatus::Skipped,
                stderr: String::new(),
            })
            .collect();

        let mut abandon_at = None;
        for stage in running.iter_mut() {
            if let Some(status) = statuses[stage.index].take() {
                stages[stage.index].status = status;
            }
            if let Some(reader) = stage.stderr.take() {
                stages[stage.index].stderr = self.collect(reader, &mut abandon_at);
            }
        }
        if let Some((index, err)) = failure {
            stages[index].status = StageStatus::Failed(err);
        }

        ExecutionResult {
            stages,
            stdout: stdout_reader.map(|reader| self.collect(reader, &mut abandon_at)),
        }
    }

    /// 读线程要等管道的所有写端关闭才结束，放到后台的孙进程会一直占着写端。
    /// 中断后最多再等 `KILL_GRACE`，之后放弃该线程，它在孙进程退出时自行结束。
    fn collect(&self, reader: JoinHandle<String>, abandon_at: &mut Option<Instant>) -> String {
        while !reader.is_finished() {
            if self.cancel.is_cancelled() {
                let at = *abandon_at.get_or_insert_with(|| Instant::now() + KILL_GRACE);
                if Instant::now() >= at {
                    warn!("输出管道仍被其他进程占用，放弃读取");
                    return String::new();
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
        reader.join().unwrap_or_default()
    }

    fn spawn_stage(
        &self,
        index: usize,
        total: usize,
        stage: &StageDescriptor,
        upstream: Option<ChildStdout>,
    ) -> Result<Child, ExecError> {
        let is_first = index == 0;
        let is_last = index + 1 == total;

        if !is_first && stage.input_path.is_some() {
            warn!("忽略非首阶段的输入重定向: {}", stage);
        }
        if !is_last && stage.output_path.is_some() {
            warn!("忽略非末阶段的输出重定向: {}", stage);
        }

        let stdin = match (&stage.input_path, upstream) {
            (_, Some(pipe)) => Stdio::from(pipe),
            (Some(path), None) if is_first => Stdio::from(open_input(path)?),
            (_, None) if is_first => Stdio::inherit(),
            (_, None) => Stdio::null(),
        };

        let stdout = match &stage.output_path {
            Some(path) if is_last => Stdio::from(open_output(path, stage.append_output)?),
            _ if !is_last || self.capture_stdout => Stdio::piped(),
            _ => Stdio::inherit(),
        };

        // Command 在函数返回时析构，父进程持有的文件和管道端随之关闭
        Command::new(&stage.program)
            .args(&stage.arguments)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::from_spawn(&stage.program, e))
    }

    fn wait_all(&self, running: &mut [RunningStage], total: usize) -> Vec<Option<StageStatus>> {
        let mut statuses = vec![None; total];
        let mut terminated_at: Option<Instant> = None;
        let mut killed = false;

        for current in 0..running.len() {
            let status = loop {
                match running[current].child.try_wait() {
                    Ok(Some(status)) => break StageStatus::from(status),
                    Ok(None) => {}
                    Err(e) => {
                        warn!("等待阶段 {} 失败: {}", running[current].index, e);
                        break StageStatus::Failed(ExecError::Other(e.to_string()));
                    }
                }

                match terminated_at {
                    None if self.cancel.is_cancelled() => {
                        warn!("管道被中断，终止剩余的子进程");
                        terminate(&running[current..]);
                        terminated_at = Some(Instant::now());
                    }
                    Some(at) if !killed && at.elapsed() >= KILL_GRACE => {
                        for stage in running[current..].iter_mut() {
                            let _ = stage.child.kill();
                        }
                        killed = true;
                    }
                    _ => {}
                }
                thread::sleep(POLL_INTERVAL);
            };

            debug!("阶段 {} 结束: {}", running[current].index, status);
            statuses[running[current].index] = Some(status);
        }

        statuses
    }
}

fn open_input(path: &str) -> Result<File, ExecError> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ExecError::InputNotFound(path.to_string()),
        _ => ExecError::Other(format!("{}: {}", path, e)),
    })
}

fn open_output(path: &str, append: bool) -> Result<File, ExecError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| ExecError::Other(format!("{}: {}", path, e)))
}

/// 在后台线程里读到 EOF，结果由 `Executor::collect` 取回
fn drain<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn terminate(stages: &[RunningStage]) {
    for stage in stages {
        let pid = Pid::from_raw(stage.child.id() as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            debug!("发送 SIGTERM 到 {} 失败: {}", pid, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::parser::parse_pipeline;
    use crate::shell::executor::SPAWN_LOCK;
    use std::io::Write;

    fn run(line: &str) -> ExecutionResult {
        #[allow(clippy::unwrap_used)]
        let pipeline = parse_pipeline(line).unwrap();
        Executor::new(CancelToken::new())
            .capture_stdout(true)
            .execute(pipeline)
    }

    #[cfg(target_os = "linux")]
    fn open_fds() -> usize {
        std::fs::read_dir("/proc/self/fd")
            .map(|dir| dir.count())
            .unwrap_or(0)
    }

    #[test]
    fn test_single_command() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("echo hello world");
        assert_eq!(result.stages.len(), 1);
        assert_eq!(result.stages[0].status, StageStatus::Exited(0));
        assert_eq!(result.stdout.as_deref(), Some("hello world\n"));
        assert_eq!(result.exit_status(), 0);
    }

    #[test]
    fn test_two_stage_pipeline() {
        let _guard = SPAWN_LOCK.lock();
        let result = run(r"printf 'a\nb\nc\n' | grep b");
        assert_eq!(result.stages.len(), 2);
        assert_eq!(result.stages[1].status, StageStatus::Exited(0));
        assert_eq!(result.stdout.as_deref(), Some("b\n"));
    }

    #[test]
    fn test_three_stage_pipeline() {
        let _guard = SPAWN_LOCK.lock();
        let result = run(r"printf 'b\na\nb\n' | sort | uniq -c");
        assert!(result.stages.iter().all(|s| s.status.success()));
        let out = result.stdout.unwrap_or_default();
        let lines: Vec<&str> = out.lines().map(str::trim).collect();
        assert_eq!(lines, vec!["1 a", "2 b"]);
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("sh -c 'seq 1 200000; seq 1 50000 >&2' | wc -l");
        assert_eq!(result.stdout.as_deref().map(str::trim), Some("200000"));
        assert_eq!(result.stages[0].stderr.lines().count(), 50000);
    }

    #[test]
    fn test_last_stage_exit_code() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("false | true");
        assert_eq!(result.stages[0].status, StageStatus::Exited(1));
        assert_eq!(result.stages[1].status, StageStatus::Exited(0));
        assert_eq!(result.exit_status(), 0);

        let result = run("true | sh -c 'exit 3'");
        assert_eq!(result.exit_status(), 3);
    }

    #[test]
    fn test_stderr_captured_per_stage() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("sh -c 'echo up >&2; echo data' | sh -c 'cat; echo down >&2'");
        assert_eq!(result.stages[0].stderr, "up\n");
        assert_eq!(result.stages[1].stderr, "down\n");
        assert_eq!(result.stdout.as_deref(), Some("data\n"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_not_found_leaks_nothing() {
        let _guard = SPAWN_LOCK.lock();
        let before = open_fds();
        let result = run("neosh-definitely-missing-program --flag");
        assert_eq!(result.stages.len(), 1);
        assert_eq!(
            result.stages[0].status,
            StageStatus::Failed(ExecError::NotFound(
                "neosh-definitely-missing-program".to_string()
            ))
        );
        assert_eq!(result.exit_status(), 127);
        assert_eq!(open_fds(), before);
    }

    #[test]
    fn test_not_found_mid_pipeline() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("yes | neosh-definitely-missing-program | wc -l");
        assert_eq!(result.stages.len(), 3);
        // 上游的 yes 在读端关闭后收到 SIGPIPE 并被回收
        assert!(matches!(
            result.stages[0].status,
            StageStatus::Signaled(_) | StageStatus::Exited(_)
        ));
        assert!(matches!(
            result.stages[1].status,
            StageStatus::Failed(ExecError::NotFound(_))
        ));
        assert_eq!(result.stages[2].status, StageStatus::Skipped);
        assert_eq!(result.exit_status(), 127);
    }

    #[test]
    fn test_permission_denied() {
        let _guard = SPAWN_LOCK.lock();
        #[allow(clippy::unwrap_used)]
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.sh");
        #[allow(clippy::unwrap_used)]
        std::fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();

        let pipeline = Pipeline::single(StageDescriptor::new(script.to_string_lossy()));
        let result = Executor::new(CancelToken::new()).execute(pipeline);
        assert_eq!(
            result.stages[0].status,
            StageStatus::Failed(ExecError::PermissionDenied(
                script.to_string_lossy().into_owned()
            ))
        );
        assert_eq!(result.exit_status(), 126);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_input_not_found_starts_nothing() {
        let _guard = SPAWN_LOCK.lock();
        let before = open_fds();
        let result = run("cat < /nonexistent/neosh/input.txt | wc -l");
        assert_eq!(
            result.stages[0].status,
            StageStatus::Failed(ExecError::InputNotFound(
                "/nonexistent/neosh/input.txt".to_string()
            ))
        );
        assert_eq!(result.stages[1].status, StageStatus::Skipped);
        assert_eq!(result.exit_status(), 1);
        assert_eq!(result.stdout, None);
        assert_eq!(open_fds(), before);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_redirections() {
        let _guard = SPAWN_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        let mut file = File::create(&input).unwrap();
        file.write_all(b"cherry\napple\nbanana\n").unwrap();
        drop(file);

        let line = format!(
            "sort < {} | head -n 2 > {}",
            input.display(),
            output.display()
        );
        let result = run(&line);
        assert!(result.success());
        // 输出重定向后不再捕获
        assert_eq!(result.stdout, None);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "apple\nbanana\n");

        let result = run(&format!("echo more >> {}", output.display()));
        assert!(result.success());
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "apple\nbanana\nmore\n"
        );

        let result = run(&format!("echo fresh > {}", output.display()));
        assert!(result.success());
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "fresh\n");
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_inner_redirections_ignored() {
        let _guard = SPAWN_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("stray.txt");
        let line = format!("echo hi > {} | cat < /nonexistent/neosh", stray.display());
        let result = run(&line);
        assert!(result.success());
        assert_eq!(result.stdout.as_deref(), Some("hi\n"));
        assert!(!stray.exists());
    }

    #[test]
    fn test_results_in_stage_order() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("sh -c 'sleep 0.2; exit 4' | sh -c 'exit 5' | sh -c 'cat >/dev/null; exit 6'");
        let codes: Vec<i32> = result.stages.iter().map(|s| s.status.code()).collect();
        assert_eq!(codes, vec![4, 5, 6]);
        let programs: Vec<&str> = result.stages.iter().map(|s| s.program.as_str()).collect();
        assert_eq!(programs, vec!["sh", "sh", "sh"]);
    }

    #[test]
    fn test_cancellation_terminates_children() {
        let _guard = SPAWN_LOCK.lock();
        #[allow(clippy::unwrap_used)]
        let pipeline = parse_pipeline("sleep 30 | cat").unwrap();
        let executor = Executor::new(CancelToken::new());
        let token = executor.cancel_token().clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        });

        let started = Instant::now();
        let result = executor.execute(pipeline);
        let _ = canceller.join();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            result.stages[0].status,
            StageStatus::Signaled(Signal::SIGTERM as i32)
        );
        assert!(matches!(
            result.stages[1].status,
            StageStatus::Exited(0) | StageStatus::Signaled(_)
        ));
    }

    #[test]
    fn test_output_open_failure_reaps_upstream() {
        let _guard = SPAWN_LOCK.lock();
        let result = run("yes | head -n 1 > /nonexistent/neosh/dir/x");
        assert_eq!(result.stages.len(), 2);
        // 下游没能启动，yes 在读端关闭后被回收
        assert!(matches!(
            result.stages[0].status,
            StageStatus::Signaled(_) | StageStatus::Exited(_)
        ));
        match &result.stages[1].status {
            StageStatus::Failed(ExecError::Other(msg)) => {
                assert!(msg.starts_with("/nonexistent/neosh/dir/x: "), "{}", msg)
            }
            other => panic!("unexpected status: {:?}", other),
        }
        assert_eq!(result.exit_status(), 1);
        assert_eq!(result.stdout, None);
    }

    #[test]
    fn test_cancellation_escalates_to_kill() {
        let _guard = SPAWN_LOCK.lock();
        #[allow(clippy::unwrap_used)]
        let pipeline = parse_pipeline(r#"sh -c 'trap "" TERM; while :; do :; done'"#).unwrap();
        let executor = Executor::new(CancelToken::new());
        let token = executor.cancel_token().clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            token.cancel();
        });

        let started = Instant::now();
        let result = executor.execute(pipeline);
        let _ = canceller.join();

        let elapsed = started.elapsed();
        assert!(elapsed >= KILL_GRACE, "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
        assert_eq!(
            result.stages[0].status,
            StageStatus::Signaled(Signal::SIGKILL as i32)
        );
        assert_eq!(result.exit_status(), 128 + Signal::SIGKILL as i32);
    }

    #[allow(clippy::unwrap_used)]
    #[test]
    fn test_cancel_gives_up_pipe_held_by_grandchild() {
        let _guard = SPAWN_LOCK.lock();
        // 孙进程只继承 stderr，stdout 里拿到它的 pid 以便清理
        let pipeline = parse_pipeline("sh -c 'sleep 5 >/dev/null & echo $!'").unwrap();
        let executor = Executor::new(CancelToken::new()).capture_stdout(true);
        let token = executor.cancel_token().clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(300));
            token.cancel();
        });

        let started = Instant::now();
        let result = executor.execute(pipeline);
        let _ = canceller.join();
        let elapsed = started.elapsed();

        let grandchild: i32 = result.stdout.as_deref().unwrap().trim().parse().unwrap();
        let _ = kill(Pid::from_raw(grandchild), Signal::SIGKILL);
        thread::sleep(Duration::from_millis(100));

        assert!(elapsed < Duration::from_secs(4), "{:?}", elapsed);
        assert_eq!(result.stages[0].status, StageStatus::Exited(0));
        assert_eq!(result.stages[0].stderr, "");
    }
}
