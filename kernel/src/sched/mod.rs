//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! - [`mlfq`]: 多级反馈队列的记账策略
//! - [`switch`]: 执行上下文和切换标签
//! - [`sched`]: 每 CPU 的调度循环

pub mod mlfq;
pub mod sched;
pub mod switch;

pub use mlfq::{MlfqPolicy, TickEvent, NLEVELS};
pub use switch::{Blocking, Context, Switch};
