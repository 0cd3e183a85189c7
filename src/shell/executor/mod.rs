mod cancel;
#[allow(clippy::module_inception)]
mod executor;
mod result;

pub use cancel::CancelToken;
pub use executor::Executor;
pub use result::{ExecError, ExecutionResult, StageReport, StageStatus};

// 启动子进程或打开文件的测试串行执行，避免文件描述符计数互相干扰
#[cfg(test)]
pub(crate) static SPAWN_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
