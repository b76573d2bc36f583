//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程执行与 MLFQ 调度核心
//!
//! 多核上的进程表、自旋锁、睡眠/唤醒、fork/exit/wait/kill、
//! 4 级反馈队列记账和每 CPU 调度循环。
//!
//! 硬件、页表和文件系统通过 trait 接入：
//! - [`arch::Arch`]: CPU 编号和中断开关
//! - [`mm::PageAllocator`] / [`mm::AddressSpace`]: 内核栈和用户地址空间
//! - [`fs::FileSystem`]: 打开文件和当前目录
//! - [`sched::Context`]: 进程的执行体

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod cpu;
pub mod errno;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;
pub mod trap;

#[cfg(test)]
mod tests;

pub use errno::Errno;
pub use kernel::{DispatchPolicy, Kernel, KernelConfig};
pub use process::{Channel, Pid, ProcState};
pub use sched::{Blocking, Context, Switch};
pub use trap::{TrapFrame, TrapKind};
