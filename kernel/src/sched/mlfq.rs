//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 多级反馈队列 (MLFQ)
//!
//! 4 个级别，级别号越小优先级越高。每个时钟 tick 对所有活跃进程记账：
//! - Running: 消耗时间片，用完降一级；累计时间达到预算时被 kill
//! - Runnable: 等待时间达到老化阈值时升一级
//! - Sleeping: 只累计 I/O 等待
//!
//! 级别只影响分派顺序（见 [`super::sched`]），记账本身不会切换进程。

use log::debug;

use crate::config::{AGING_THRESHOLD, TIME_SLICES};
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Proc, ProcFlags, ProcState};

/// 队列级数
pub const NLEVELS: usize = 4;

/// 最低优先级
pub const LOWEST_LEVEL: usize = NLEVELS - 1;

/// 一次记账的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    None,
    /// 累计 CPU 时间达到预算，已标记 KILLED
    BudgetExceeded,
    /// 时间片用完，降级
    Demoted { from: usize, to: usize },
    /// 最低级的时间片用完，只重置 burst
    Rotated,
    /// 等待超过老化阈值，升级
    Promoted { from: usize, to: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MlfqPolicy {
    slices: [u64; NLEVELS],
    aging_threshold: u64,
}

impl MlfqPolicy {
    pub const fn new(slices: [u64; NLEVELS], aging_threshold: u64) -> Self {
        Self {
            slices,
            aging_threshold,
        }
    }

    /// 某一级的时间片长度
    pub fn slice(&self, level: usize) -> u64 {
        self.slices[level.min(LOWEST_LEVEL)]
    }

    pub fn aging_threshold(&self) -> u64 {
        self.aging_threshold
    }

    /// 对一个描述符记一个 tick
    pub fn tick(&self, p: &mut Proc, now: u64) -> TickEvent {
        match p.state {
            ProcState::Running => self.charge(p, now),
            ProcState::Runnable => self.age(p, now),
            ProcState::Sleeping => {
                p.sched.io_wait += 1;
                TickEvent::None
            }
            _ => TickEvent::None,
        }
    }

    fn charge(&self, p: &mut Proc, now: u64) -> TickEvent {
        let s = &mut p.sched;
        s.burst += 1;
        s.total += 1;
        p.flags.remove(ProcFlags::SLICE_EXHAUSTED);

        if let Some(budget) = s.budget {
            if s.total >= budget {
                if p.flags.contains(ProcFlags::KILLED) {
                    return TickEvent::None;
                }
                p.flags.insert(ProcFlags::KILLED);
                return TickEvent::BudgetExceeded;
            }
        }

        if s.burst < self.slice(s.level) {
            return TickEvent::None;
        }

        p.flags.insert(ProcFlags::SLICE_EXHAUSTED);
        if s.level < LOWEST_LEVEL {
            let from = s.level;
            s.enter_level(from + 1, now);
            TickEvent::Demoted { from, to: from + 1 }
        } else {
            s.burst = 0;
            TickEvent::Rotated
        }
    }

    fn age(&self, p: &mut Proc, now: u64) -> TickEvent {
        let s = &mut p.sched;
        s.cpu_wait += 1;
        if s.cpu_wait >= self.aging_threshold && s.level > 0 {
            let from = s.level;
            s.enter_level(from - 1, now);
            TickEvent::Promoted { from, to: from - 1 }
        } else {
            TickEvent::None
        }
    }
}

impl Default for MlfqPolicy {
    fn default() -> Self {
        Self::new(TIME_SLICES, AGING_THRESHOLD)
    }
}

impl Kernel {
    /// 设置当前进程的 MLFQ 字段
    ///
    /// `budget == 0` 表示不限制。累计 CPU 时间保持不变。
    pub fn set_proc_info(
        &self,
        level: isize,
        burst: isize,
        cpu_wait: isize,
        io_wait: isize,
        budget: isize,
    ) -> Result<(), Errno> {
        if !(0..NLEVELS as isize).contains(&level)
            || burst < 0
            || cpu_wait < 0
            || io_wait < 0
            || budget < 0
        {
            return Err(Errno::InvalidArgument);
        }

        let cur = self.current("set_proc_info");
        let mut table = self.ptable.lock(&self.cpus);
        let now = table.now();
        let p = table.get_mut(cur);
        p.sched.level = level as usize;
        p.sched.burst = burst as u64;
        p.sched.cpu_wait = cpu_wait as u64;
        p.sched.io_wait = io_wait as u64;
        p.sched.budget = (budget > 0).then_some(budget as u64);
        p.sched.queue_enter = now;

        debug!(
            "pid {}: set_proc_info level {} budget {:?}",
            p.pid, level, p.sched.budget
        );
        Ok(())
    }
}
