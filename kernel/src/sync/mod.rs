//! 同步原语 (Synchronization Primitives)
//!
//! - `spinlock`: 关中断的自旋锁，内核所有其他子系统都建立在它之上
//!
//! 阻塞式等待（sleep / wakeup）依赖进程表，实现在 `process::sleep`。

pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard};
