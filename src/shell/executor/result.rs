use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use thiserror::Error;

pub const STATUS_NOT_FOUND: i32 = 127;
pub const STATUS_PERMISSION_DENIED: i32 = 126;
pub const STATUS_FAILURE: i32 = 1;

/// 启动阶段时发生的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("input file not found: {0}")]
    InputNotFound(String),
    #[error("{0}")]
    Other(String),
}

impl ExecError {
    pub fn from_spawn(program: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ExecError::NotFound(program.to_string()),
            io::ErrorKind::PermissionDenied => ExecError::PermissionDenied(program.to_string()),
            _ => ExecError::Other(format!("{}: {}", program, err)),
        }
    }

    pub fn exit_status(&self) -> i32 {
        match self {
            ExecError::NotFound(_) => STATUS_NOT_FOUND,
            ExecError::PermissionDenied(_) => STATUS_PERMISSION_DENIED,
            ExecError::InputNotFound(_) | ExecError::Other(_) => STATUS_FAILURE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    Signaled(i32),
    /// 启动失败，进程从未存在
    Failed(ExecError),
    /// 上游阶段启动失败，本阶段未尝试启动
    Skipped,
}

impl StageStatus {
    pub fn code(&self) -> i32 {
        match self {
            StageStatus::Exited(code) => *code,
            StageStatus::Signaled(sig) => 128 + sig,
            StageStatus::Failed(err) => err.exit_status(),
            StageStatus::Skipped => STATUS_FAILURE,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, StageStatus::Exited(0))
    }
}

impl From<ExitStatus> for StageStatus {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => StageStatus::Exited(code),
            (None, Some(sig)) => StageStatus::Signaled(sig),
            (None, None) => StageStatus::Exited(STATUS_FAILURE),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Exited(code) => write!(f, "exited with {}", code),
            StageStatus::Signaled(sig) => write!(f, "killed by signal {}", sig),
            StageStatus::Failed(err) => write!(f, "{}", err),
            StageStatus::Skipped => f.write_str("not started"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub program: String,
    pub status: StageStatus,
    pub stderr: String,
}

/// 一次管道执行的结果，按阶段顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stages: Vec<StageReport>,
    pub stdout: Option<String>,
}

impl ExecutionResult {
    pub fn first_failure(&self) -> Option<&ExecError> {
        self.stages.iter().find_map(|stage| match &stage.status {
            StageStatus::Failed(err) => Some(err),
            _ => None,
        })
    }

    /// 整条管道的退出码：有阶段启动失败时取第一个失败的错误码，否则取最后一个阶段的退出码
    pub fn exit_status(&self) -> i32 {
        if let Some(err) = self.first_failure() {
            return err.exit_status();
        }
        self.stages
            .last()
            .map(|stage| stage.status.code())
            .unwrap_or(0)
    }

    pub fn success(&self) -> bool {
        self.exit_status() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(program: &str, status: StageStatus) -> StageReport {
        StageReport {
            program: program.to_string(),
            status,
            stderr: String::new(),
        }
    }

    #[test]
    fn test_spawn_error_mapping() {
        let err = ExecError::from_spawn("nope", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err, ExecError::NotFound("nope".to_string()));
        assert_eq!(err.exit_status(), 127);

        let err = ExecError::from_spawn("x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err, ExecError::PermissionDenied("x".to_string()));
        assert_eq!(err.exit_status(), 126);

        let err = ExecError::from_spawn("x", io::Error::from(io::ErrorKind::OutOfMemory));
        assert!(matches!(err, ExecError::Other(_)));
        assert_eq!(err.exit_status(), 1);
    }

    #[test]
    fn test_last_stage_decides() {
        let result = ExecutionResult {
            stages: vec![
                report("false", StageStatus::Exited(1)),
                report("cat", StageStatus::Exited(0)),
            ],
            stdout: None,
        };
        assert_eq!(result.exit_status(), 0);

        let result = ExecutionResult {
            stages: vec![
                report("yes", StageStatus::Signaled(13)),
                report("head", StageStatus::Signaled(15)),
            ],
            stdout: None,
        };
        assert_eq!(result.exit_status(), 143);
    }

    #[test]
    fn test_launch_failure_decides() {
        let result = ExecutionResult {
            stages: vec![
                report("cat", StageStatus::Exited(0)),
                report("nope", StageStatus::Failed(ExecError::NotFound("nope".into()))),
                report("wc", StageStatus::Skipped),
            ],
            stdout: None,
        };
        assert_eq!(result.exit_status(), 127);
        assert!(!result.success());
    }
}
