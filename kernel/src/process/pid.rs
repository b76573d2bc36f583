//! PID 管理
//!
//! PID 从 1 开始单调递增，进程回收后不复用：
//! - PID 1: init 进程（第一个分配的描述符）
//! - PID 2+: 普通进程

use core::sync::atomic::{AtomicU32, Ordering};

use super::Pid;

/// 最大 PID 数值
pub const PID_MAX_LIMIT: Pid = 4194304;

/// init 进程的 PID
pub const PID_INIT: Pid = 1;

/// PID 分配器，每个进程表一份
#[derive(Debug)]
pub struct PidAllocator {
    next: AtomicU32,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(PID_INIT),
        }
    }

    /// 分配一个新的 PID，用尽时返回 `None`
    pub fn alloc(&self) -> Option<Pid> {
        let pid = self.next.fetch_add(1, Ordering::Relaxed);
        if pid >= PID_MAX_LIMIT {
            // 回退，避免计数器绕回后复用旧值
            self.next.store(PID_MAX_LIMIT, Ordering::Relaxed);
            None
        } else {
            Some(pid)
        }
    }

    /// 下一个将要分配的 PID
    pub fn peek(&self) -> Pid {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
