use log::debug;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::Lazy;

use crate::shell::executor::CancelToken;

static INTERRUPT: Lazy<CancelToken> = Lazy::new(CancelToken::new);

extern "C" fn on_interrupt(_: libc::c_int) {
    INTERRUPT.cancel();
}

/// SIGINT 触发的取消标记，执行器等待子进程时检查它
pub fn interrupt_token() -> CancelToken {
    INTERRUPT.clone()
}

/// 安装 SIGINT 处理函数，shell 自身不会被 Ctrl-C 杀死。
/// 子进程 exec 后处理函数会恢复为默认行为。
pub fn setup_interrupt_handler() -> nix::Result<()> {
    Lazy::force(&INTERRUPT);
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
    debug!("SIGINT 处理函数已安装");
    Ok(())
}
