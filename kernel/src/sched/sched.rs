//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器实现
//!
//! 每个 CPU 运行一个永不返回的调度循环 [`Kernel::scheduler`]：
//! - 开中断，锁住进程表
//! - 按分派策略挑选一个 Runnable 进程，标记为 Running 并记录到本 CPU
//! - 放锁，切换进入进程的上下文
//! - 进程交出 CPU 时带回进程表锁，调度器检查不变量后放回上下文
//! - 被时钟抢占后又被 kill 的进程不再切入，直接退出
//!
//! [`Kernel::run_once`] 是一轮分派，测试直接调用它驱动调度。

use core::ptr;

use crate::kernel::{DispatchPolicy, Kernel};
use crate::process::{Pid, ProcFlags, ProcState, ProcTable};
use crate::sync::SpinLockGuard;

use super::switch::{swtch, Switch};

impl Kernel {
    /// 本 CPU 的调度循环
    pub fn scheduler(&self) -> ! {
        loop {
            if self.run_once().is_none() {
                core::hint::spin_loop();
            }
        }
    }

    /// 分派一次
    ///
    /// 没有可运行的进程时返回 `None`；否则运行选中的进程直到它交出 CPU，
    /// 返回它的 PID。
    pub fn run_once(&self) -> Option<Pid> {
        // 开中断，避免所有进程都在等 I/O 时整个系统卡死
        self.cpus.arch().intr_on();

        let mut table = self.ptable.lock(&self.cpus);
        let cpu = self.cpus.mycpu();
        let slot = self.pick_next(&table, cpu.sched_index())?;
        cpu.set_sched_index(slot);

        let p = table.get_mut(slot);
        p.state = ProcState::Running;
        p.chan = None;
        let first_run = !core::mem::replace(&mut p.started, true);
        // 抢占期间被 kill 的进程不再回到用户态
        let exiting =
            p.flags.contains(ProcFlags::PREEMPTED) && p.killed() && p.tf.from_user;
        p.flags.remove(ProcFlags::PREEMPTED);
        let pid = p.pid;
        let mut ctx = p
            .context
            .take()
            .unwrap_or_else(|| panic!("scheduler: pid {} has no context", pid));
        let mut tf = p.tf;
        if let Some(vm) = p.vm.as_ref() {
            vm.activate();
        }
        cpu.set_proc(Some(slot));
        drop(table);

        if first_run {
            self.forkret();
        }

        let switch = if exiting { self.exit() } else { Switch::Continue };
        let mut table = match switch {
            Switch::Sched(table) => table,
            Switch::Continue => swtch(self, &mut *ctx, &mut tf),
        };
        self.check_sched(&table, slot);

        // 进程已经交出 CPU，状态由它自己在持锁时改好
        let p = table.get_mut(slot);
        p.tf = tf;
        p.context = Some(ctx);
        self.cpus.mycpu().set_proc(None);
        drop(table);

        Some(pid)
    }

    /// 交出 CPU，进入下一轮调度
    pub fn yield_cpu(&self) -> Switch<'_> {
        let cur = self.current("yield");
        let mut table = self.ptable.lock(&self.cpus);
        table.get_mut(cur).state = ProcState::Runnable;
        Switch::Sched(table)
    }

    /// 挑选下一个要运行的槽位，从 `last` 之后开始轮转
    fn pick_next(&self, table: &ProcTable, last: usize) -> Option<usize> {
        let n = table.len();
        let mut runnable = (1..=n)
            .map(|offset| (last + offset) % n)
            .filter(|&i| table.get(i).state == ProcState::Runnable);

        match self.dispatch {
            DispatchPolicy::Flat => runnable.next(),
            DispatchPolicy::Priority => runnable.min_by_key(|&i| {
                let s = table.get(i).sched();
                (s.level, s.queue_enter)
            }),
        }
    }

    /// 进程第一次被调度时执行
    fn forkret(&self) {
        // 文件系统初始化可能会睡眠，不能在 main 里做
        self.fs_ready.call_once(|| self.fs.init());
    }

    /// 切回调度器时的不变量
    fn check_sched(&self, table: &SpinLockGuard<'_, ProcTable>, slot: usize) {
        if self.cpus.arch().intr_get() {
            panic!("sched interruptible");
        }
        if !ptr::eq(table.spinlock(), &self.ptable) || !self.ptable.holding(&self.cpus) {
            panic!("sched ptable.lock");
        }
        if self.cpus.mycpu().ncli() != 1 {
            panic!("sched locks");
        }
        if table.get(slot).state == ProcState::Running {
            panic!("sched running");
        }
    }
}
