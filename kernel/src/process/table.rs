//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程表
//!
//! 固定大小的描述符数组，整体由一把自旋锁 (`ptable`) 保护。
//! 描述符之间的父子关系用槽位下标表示，父进程不拥有子进程。

use alloc::vec::Vec;

use log::{debug, warn};

use super::pid::PidAllocator;
use super::proc::{Channel, Proc, ProcInfo, ProcState, SchedInfo};
use crate::errno::Errno;
use crate::process::Pid;
use crate::sched::mlfq::{MlfqPolicy, TickEvent};

pub struct ProcTable {
    pub(crate) procs: Vec<Proc>,
    pids: PidAllocator,
    /// 最近一次记账的 tick，持有 ptable 的代码用它代替 tickslock
    now: u64,
}

impl ProcTable {
    pub fn new(nproc: usize) -> Self {
        Self {
            procs: (0..nproc).map(|_| Proc::default()).collect(),
            pids: PidAllocator::new(),
            now: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    pub fn get(&self, slot: usize) -> &Proc {
        &self.procs[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut Proc {
        &mut self.procs[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Proc> {
        self.procs.iter()
    }

    /// 按 PID 查找已占用的槽位
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.procs
            .iter()
            .position(|p| p.state != ProcState::Unused && p.pid == pid)
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// 槽位对应的 channel，wait 在自己的 channel 上睡眠
    pub fn chan_of(&self, slot: usize) -> Channel {
        Channel::of(&self.procs[slot])
    }

    /// 占用一个空槽位并分配 PID
    ///
    /// 返回时槽位处于 Embryo 状态，其余字段保持默认值。
    pub(crate) fn alloc_slot(&mut self) -> Result<usize, Errno> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)
            .ok_or(Errno::TryAgain)?;
        let pid = self.pids.alloc().ok_or(Errno::TryAgain)?;

        let now = self.now;
        let p = &mut self.procs[slot];
        p.state = ProcState::Embryo;
        p.pid = pid;
        p.sched = SchedInfo::new(now);
        Ok(slot)
    }

    /// 唤醒在 `chan` 上睡眠的所有进程，调用者持有 ptable
    pub fn wakeup1(&mut self, chan: Channel) -> usize {
        let mut woken = 0;
        for p in self.procs.iter_mut() {
            if p.state == ProcState::Sleeping && p.chan == Some(chan) {
                p.state = ProcState::Runnable;
                p.chan = None;
                woken += 1;
            }
        }
        woken
    }

    /// 时钟中断的记账：推进 MLFQ 计数器并回收到期的延迟释放
    pub(crate) fn account(&mut self, policy: &MlfqPolicy, now: u64) {
        self.now = now;
        for p in self.procs.iter_mut() {
            match policy.tick(p, now) {
                TickEvent::None | TickEvent::Rotated => {}
                TickEvent::BudgetExceeded => {
                    warn!("pid {}: used {} ticks, killed", p.pid, p.sched.total);
                }
                TickEvent::Demoted { from, to } => {
                    debug!("pid {}: demoted {} -> {}", p.pid, from, to);
                }
                TickEvent::Promoted { from, to } => {
                    debug!("pid {}: aged {} -> {}", p.pid, from, to);
                }
            }

            if p.state.is_live() && p.dealloc.is_pending() && now >= p.dealloc.deadline() {
                let phys = p.sz + p.dealloc.size;
                if let Some(vm) = p.vm.as_mut() {
                    vm.shrink(phys, p.sz);
                }
                debug!(
                    "pid {}: reclaimed {} deferred bytes at tick {}",
                    p.pid, p.dealloc.size, now
                );
                p.dealloc = Default::default();
            }
        }
    }

    /// 进程表快照
    pub fn snapshot(&self) -> Vec<ProcInfo> {
        self.procs
            .iter()
            .filter(|p| p.state != ProcState::Unused)
            .map(ProcInfo::from)
            .collect()
    }
}
