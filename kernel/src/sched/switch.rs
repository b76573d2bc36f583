//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 上下文切换
//!
//! 进程的执行体抽象为 [`Context`]：调度器调用 `resume` 进入进程，
//! 进程在需要交出 CPU 的地方返回 [`Switch::Sched`]，
//! 其中携带着**仍然持有**的进程表锁。调度器在同一个 CPU 上检查不变量后释放它，
//! 这样从进程修改状态到调度器接管之间不存在放锁的窗口。
//!
//! 不会返回的操作（exit）和会阻塞的操作（wait / sleep）都返回切换标签，
//! 调用者必须把它原样向上传递，直到 `resume` 返回。

use alloc::boxed::Box;

use crate::kernel::Kernel;
use crate::process::ProcTable;
use crate::sync::SpinLockGuard;
use crate::trap::TrapFrame;

/// 从进程返回调度器时的标签
#[must_use = "a Sched switch must be handed back to the scheduler"]
pub enum Switch<'k> {
    /// 继续运行当前进程
    Continue,
    /// 交出 CPU，携带进程表锁
    Sched(SpinLockGuard<'k, ProcTable>),
}

impl Switch<'_> {
    pub fn is_continue(&self) -> bool {
        matches!(self, Switch::Continue)
    }
}

/// 可能阻塞的内核调用的结果
#[must_use]
pub enum Blocking<'k, T> {
    /// 已完成
    Ready(T),
    /// 已经睡眠，被唤醒后需要重新发起调用
    Pending(Switch<'k>),
}

/// 进程的执行上下文
///
/// `resume` 就是切换原语：从调度器切入进程，返回即切回调度器。
/// 实现者负责在两次 `resume` 之间保存自己的执行位置。
pub trait Context: Send {
    /// 运行到下一个切换点
    fn resume<'k>(&mut self, kernel: &'k Kernel, tf: &mut TrapFrame) -> Switch<'k>;

    /// 复制一份上下文，fork 用它生成子进程的执行体
    fn duplicate(&self) -> Box<dyn Context>;
}

/// 切换到 `ctx`，直到它交出 CPU
pub(crate) fn swtch<'k>(
    kernel: &'k Kernel,
    ctx: &mut dyn Context,
    tf: &mut TrapFrame,
) -> SpinLockGuard<'k, ProcTable> {
    loop {
        if let Switch::Sched(table) = ctx.resume(kernel, tf) {
            return table;
        }
    }
}
