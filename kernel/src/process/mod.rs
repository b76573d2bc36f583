//! 进程管理模块
//!
//! - `proc`: 进程描述符
//! - `table`: 进程表
//! - `pid`: PID 分配
//! - `fork`: 进程创建 (allocproc / userinit / fork)
//! - `wait`: 进程退出与回收 (exit / wait / kill)
//! - `sleep`: 睡眠与唤醒
//! - `memory`: 用户地址空间大小调整 (sbrk / 延迟释放)

pub mod fork;
pub mod memory;
pub mod pid;
pub mod proc;
pub mod sleep;
pub mod table;
pub mod wait;

pub use proc::{
    Channel, PendingDealloc, Pid, Proc, ProcFlags, ProcInfo, ProcState, SchedInfo,
};
pub use table::ProcTable;
